mod app;
use neuros_srs::*;

use app::MyApp;
use clap::Parser;
use database::db::{add_deck, get_all_decks, init_database, load_all_decks};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn sample_deck() -> Deck {
    Deck {
        name: "Polish Vocabulary".to_string(),
        flashcards: vec![
            Flashcard::new("cześć", "hello"),
            Flashcard::new("dziękuję", "thank you"),
            Flashcard::new("proszę", "please").with_explanation("Also used for 'you're welcome'"),
        ],
    }
}

fn main() {
    // Parse flags first so --help/--version print without log noise
    let config = Config::parse();

    // Logs go to stderr, filtered by RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(config) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    info!(db = %config.db_path.display(), user = %config.user_id, "Starting Neuros");
    let conn = init_database(&config.db_path)?;

    if get_all_decks(&conn)?.is_empty() {
        let count = add_deck(&sample_deck(), &config.user_id, &conn)?;
        info!(cards = count, "Sample data created");
    }

    let deck_set = load_all_decks(&conn)?;

    info!(decks = deck_set.decks.len(), "Loaded decks from database");
    for deck in &deck_set.decks {
        info!("  - {} ({} cards)", deck.name, deck.flashcards.len());
    }
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([520.0, 760.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Neuros",
        options,
        Box::new(|_cc| Ok(Box::new(MyApp::new(deck_set, conn, config)))),
    )?;
    Ok(())
}
