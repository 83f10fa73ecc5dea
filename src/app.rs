//! Main application UI and state management.
//! Handles the deck management interface, statistics and review sessions.

use neuros_srs::config::Config;
use neuros_srs::database::db;
use neuros_srs::error::{Result, SrsError};
use neuros_srs::export::json::{export_json_to_path, import_json};
use neuros_srs::models::due::DEFAULT_UPCOMING_DAYS;
use neuros_srs::models::sm2::preview;
use neuros_srs::models::{
    CardStats, CompletionState, DeckSet, Flashcard, LearningSession, Rating, UserStats,
};
use chrono::{DateTime, NaiveDate, Utc};
use eframe::egui;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, warn};

/// Application screen states
#[derive(Default)]
enum AppScreen {
    #[default]
    Main,
    LearningSession,
}

/// Main application state
pub struct MyApp {
    show_confirmation_dialog: bool,
    allowed_to_close: bool,
    all_decks: DeckSet,
    selected_deck_index: Option<usize>,
    current_front: String,
    current_back: String,
    new_deck_name: String,
    conn: Arc<Mutex<Connection>>,
    config: Config,

    current_screen: AppScreen,
    learning_session: Option<LearningSession>,

    current_date: Option<DateTime<Utc>>,
    card_stats: CardStats,
    user_stats: UserStats,
    upcoming: BTreeMap<NaiveDate, usize>,
    completion: CompletionState,

    show_export_dialog: bool,
    show_result_dialog: bool,
    result_message: String,
}

/// Formats a timestamp as YYYY-MM-DD
fn format_date(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d").to_string()
}

fn lock(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| SrsError::LockPoisoned(e.to_string()))
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        match self.current_screen {
            AppScreen::Main => self.render_main_screen(ctx),
            AppScreen::LearningSession => self.render_learning_screen(ctx),
        }

        // Handle window close requests with confirmation dialog
        if ctx.input(|i| i.viewport().close_requested()) && !self.allowed_to_close {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.show_confirmation_dialog = true;
        }

        if self.show_confirmation_dialog {
            egui::Window::new("Do you want to quit?")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("No").clicked() {
                            self.show_confirmation_dialog = false;
                            self.allowed_to_close = false;
                        }

                        if ui.button("Yes").clicked() {
                            self.show_confirmation_dialog = false;
                            self.allowed_to_close = true;
                            ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                        }
                    });
                });
        }

        if self.show_export_dialog {
            let mut export_deck_index: Option<usize> = None;
            let mut should_cancel = false;

            egui::Window::new("Export Deck")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label("Select a deck to export:");
                    ui.separator();

                    for (i, deck) in self.all_decks.decks.iter().enumerate() {
                        if ui
                            .button(format!("{} ({} cards)", deck.name, deck.flashcards.len()))
                            .clicked()
                        {
                            export_deck_index = Some(i);
                        }
                    }

                    ui.separator();

                    if ui.button("Cancel").clicked() {
                        should_cancel = true;
                    }
                });

            if let Some(i) = export_deck_index {
                self.handle_export(i);
            }
            if should_cancel {
                self.show_export_dialog = false;
            }
        }

        if self.show_result_dialog {
            egui::Window::new("Result")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(&self.result_message);
                    ui.add_space(10.0);
                    if ui.button("OK").clicked() {
                        self.show_result_dialog = false;
                    }
                });
        }
    }
}

impl MyApp {
    /// Creates a new application instance with decks loaded from database
    pub fn new(deck_set: DeckSet, conn: Connection, config: Config) -> Self {
        let has_decks = !deck_set.decks.is_empty();
        let mut app = Self {
            show_confirmation_dialog: false,
            allowed_to_close: false,
            all_decks: deck_set,
            selected_deck_index: if has_decks { Some(0) } else { None },
            current_front: String::new(),
            current_back: String::new(),
            new_deck_name: String::new(),
            conn: Arc::new(Mutex::new(conn)),
            config,
            current_screen: AppScreen::Main,
            learning_session: None,
            current_date: None,
            card_stats: CardStats::default(),
            user_stats: UserStats::default(),
            upcoming: BTreeMap::new(),
            completion: CompletionState::NewUser,
            show_export_dialog: false,
            show_result_dialog: false,
            result_message: String::new(),
        };
        app.refresh();
        app
    }

    fn show_result(&mut self, message: String) {
        self.result_message = message;
        self.show_result_dialog = true;
    }

    fn report(&mut self, context: &str, err: SrsError) {
        error!("{}: {}", context, err);
        self.show_result(format!("{}: {}", context, err));
    }

    /// Reloads the simulated date, decks and statistics from the database.
    fn refresh(&mut self) {
        if let Err(e) = self.try_refresh() {
            self.report("Failed to load data", e);
        }
    }

    fn try_refresh(&mut self) -> Result<()> {
        let conn = lock(&self.conn)?;
        let now = db::get_current_date(&conn)?;
        self.all_decks = db::load_all_decks(&conn)?;
        self.card_stats = db::card_stats(&self.config.user_id, now, &conn)?;
        self.user_stats = db::user_stats(&self.config.user_id, now.date_naive(), &conn)?;
        self.upcoming = db::upcoming_reviews(&self.config.user_id, now, DEFAULT_UPCOMING_DAYS, &conn)?;
        self.completion = db::completion_state(&self.config.user_id, now, &conn)?;
        self.current_date = Some(now);
        Ok(())
    }

    fn due_count(&self, deck_name: &str) -> usize {
        let Some(now) = self.current_date else {
            return 0;
        };
        lock(&self.conn)
            .and_then(|conn| db::get_due_cards(&self.config.user_id, Some(deck_name), now, None, &conn))
            .map(|due| due.len())
            .unwrap_or_else(|e| {
                warn!(deck = deck_name, "Could not count due cards: {}", e);
                0
            })
    }

    /// Renders the main screen with deck management interface
    fn render_main_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                let date = self
                    .current_date
                    .map(format_date)
                    .unwrap_or_else(|| "Unknown".to_string());
                ui.label(date);

                if ui.button("Next Day").clicked() {
                    let advanced = lock(&self.conn).and_then(|conn| db::advance_day(&conn).map(|_| ()));
                    match advanced {
                        Ok(()) => self.refresh(),
                        Err(e) => self.report("Failed to advance day", e),
                    }
                }
            });
            ui.separator();

            ui.heading(self.completion.message());
            ui.label(format!(
                "Cards: {}  Due: {}  Mastered: {}  Learning: {}  Difficult: {}",
                self.card_stats.total_cards,
                self.card_stats.due_cards,
                self.card_stats.mastered,
                self.card_stats.learning,
                self.card_stats.difficult
            ));
            ui.label(format!(
                "Reviews: {}  Accuracy: {}%  Streak: {} days (best {})  Study time: {} min",
                self.user_stats.total_reviews,
                self.user_stats.average_accuracy,
                self.user_stats.current_streak_days,
                self.user_stats.longest_streak_days,
                self.user_stats.total_study_minutes
            ));
            if !self.upcoming.is_empty() {
                let forecast: Vec<String> = self
                    .upcoming
                    .iter()
                    .map(|(day, count)| format!("{}: {}", day.format("%m-%d"), count))
                    .collect();
                ui.label(format!("Upcoming: {}", forecast.join(", ")));
            }
            ui.separator();

            // Import/Export buttons
            ui.horizontal(|ui| {
                if ui.button("Export Deck").clicked() {
                    self.show_export_dialog = true;
                }
                if ui.button("Import Deck").clicked() {
                    self.handle_import();
                }
            });

            ui.separator();

            ui.heading("Create New Deck");
            ui.horizontal(|ui| {
                ui.label("Deck name:");
                ui.text_edit_singleline(&mut self.new_deck_name);
                if ui.button("Create Deck").clicked() && !self.new_deck_name.trim().is_empty() {
                    let name = self.new_deck_name.trim().to_string();
                    let created = lock(&self.conn).and_then(|conn| db::new_deck(&name, &conn));
                    match created {
                        Ok(()) => {
                            self.new_deck_name.clear();
                            self.refresh();
                        }
                        Err(e) => self.report("Failed to create deck", e),
                    }
                }
            });

            ui.separator();

            ui.heading(format!("Decks ({})", self.all_decks.decks.len()));

            // We store actions to execute after UI rendering to avoid borrowing conflicts
            let mut action_select: Option<usize> = None;
            let mut action_learn: Option<usize> = None;
            let due_counts: Vec<usize> = self
                .all_decks
                .decks
                .iter()
                .map(|d| self.due_count(&d.name))
                .collect();

            egui::ScrollArea::vertical()
                .id_salt("decks_list")
                .max_height(150.0)
                .show(ui, |ui| {
                    for (i, deck) in self.all_decks.decks.iter().enumerate() {
                        let is_selected = self.selected_deck_index == Some(i);

                        ui.horizontal(|ui| {
                            if ui
                                .selectable_label(
                                    is_selected,
                                    format!(
                                        "{}. {} ({} cards, {} due)",
                                        i + 1,
                                        deck.name,
                                        deck.flashcards.len(),
                                        due_counts[i]
                                    ),
                                )
                                .clicked()
                            {
                                action_select = Some(i);
                            }

                            if ui.button("Learn").clicked() {
                                action_learn = Some(i);
                            }
                        });
                    }
                });

            // Execute deferred actions
            if let Some(i) = action_select {
                self.selected_deck_index = Some(i);
            }
            if let Some(i) = action_learn {
                self.start_learning_session(i);
            }

            ui.separator();

            // Card management for selected deck
            let Some(deck_index) = self.selected_deck_index else {
                ui.label("Select a deck to add flashcards");
                return;
            };
            let Some(deck_name) = self.all_decks.decks.get(deck_index).map(|d| d.name.clone()) else {
                return;
            };

            ui.heading(format!("Selected Deck: {}", deck_name));

            ui.horizontal(|ui| {
                ui.label("Front:");
                ui.text_edit_singleline(&mut self.current_front);
            });

            ui.horizontal(|ui| {
                ui.label("Back:");
                ui.text_edit_singleline(&mut self.current_back);
            });
            if ui.button("Add Flashcard").clicked()
                && !self.current_front.trim().is_empty()
                && !self.current_back.trim().is_empty()
            {
                let card = Flashcard::new(self.current_front.trim(), self.current_back.trim());
                let user_id = self.config.user_id.clone();
                let added = lock(&self.conn).and_then(|conn| {
                    let card_id = db::add_card(&deck_name, &card, &conn)?;
                    db::assign_card(&user_id, card_id, &conn)
                });
                match added {
                    Ok(()) => {
                        self.current_front.clear();
                        self.current_back.clear();
                        self.refresh();
                    }
                    Err(e) => self.report("Failed to add flashcard", e),
                }
            }

            ui.separator();

            if let Some(current_deck) = self.all_decks.decks.get(deck_index) {
                ui.heading(format!("Flashcards ({})", current_deck.flashcards.len()));

                egui::ScrollArea::vertical()
                    .id_salt("flashcards_list")
                    .max_height(200.0)
                    .show(ui, |ui| {
                        for (i, flashcard) in current_deck.flashcards.iter().enumerate() {
                            ui.group(|ui| {
                                ui.label(format!("{}. Front: {}", i + 1, flashcard.front));
                                ui.label(format!("   Back: {}", flashcard.back));
                            });
                        }
                    });
            }
        });
    }

    /// Renders the learning session screen with the review interface
    fn render_learning_screen(&mut self, ctx: &egui::Context) {
        let mut action_toggle_answer = false;
        let mut action_grade: Option<Rating> = None;
        let mut action_back = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(session) = &self.learning_session else {
                action_back = true;
                return;
            };

            ui.heading(format!("Learning: {}", session.deck_name));
            ui.label(session.phase_message());
            ui.label(format!(
                "Progress: {} / {} recalled ({} remaining)",
                session.learned_count(),
                session.total_count(),
                session.remaining_count()
            ));

            ui.add_space(20.0);

            if session.is_completed() {
                ui.heading("Congratulations!");
                ui.label(format!(
                    "Session complete: {} reviews, {} correct.",
                    session.cards_studied(),
                    session.cards_correct()
                ));

                ui.add_space(20.0);

                if ui.button("Back to Main Screen").clicked() {
                    action_back = true;
                }
                return;
            }

            let Some((card, state)) = session.current_card() else {
                return;
            };
            let show_answer = session.show_answer;

            ui.group(|ui| {
                ui.set_min_height(200.0);
                ui.vertical_centered(|ui| {
                    ui.add_space(20.0);

                    ui.heading("Front:");
                    ui.label(&card.flashcard.front);

                    ui.add_space(20.0);

                    if show_answer {
                        ui.heading("Back:");
                        ui.label(&card.flashcard.back);
                        if let Some(explanation) = &card.flashcard.explanation {
                            ui.add_space(10.0);
                            ui.label(explanation);
                        }
                    } else {
                        ui.label("(Click 'Show Answer' to reveal)");
                    }

                    ui.add_space(20.0);
                });
            });

            ui.add_space(10.0);
            ui.label(format!(
                "Ease factor {:.2} · interval {} days · mastery {}%",
                state.ease_factor, state.interval_days, state.mastery_level
            ));
            ui.add_space(10.0);

            if !show_answer && ui.button("Show Answer").clicked() {
                action_toggle_answer = true;
            }

            // Rating buttons (0-5) labelled with the resulting interval
            if show_answer && !card.is_learned {
                ui.label("Rate your response:");
                let now = self.current_date.unwrap_or(state.next_review_at);
                let outcomes = preview(state, now, &self.config.scheduler());
                for row in outcomes.chunks(3) {
                    ui.horizontal(|ui| {
                        for (rating, next) in row {
                            let text = format!(
                                "{} - {} ({}d)",
                                rating.value(),
                                rating.label(),
                                next.interval_days
                            );
                            if ui.button(text).clicked() {
                                action_grade = Some(*rating);
                            }
                        }
                    });
                }
            }

            ui.add_space(20.0);

            if ui.button("Back to Main Screen").clicked() {
                action_back = true;
            }
        });

        // Execute deferred actions
        if let Some(session) = &mut self.learning_session {
            if action_toggle_answer {
                session.toggle_answer();
            }
            if let Some(rating) = action_grade {
                match session.grade_current_card(rating) {
                    Ok(()) => session.next_card(),
                    Err(e) => {
                        error!("Failed to save review: {}", e);
                        self.result_message = format!("Failed to save review: {}", e);
                        self.show_result_dialog = true;
                    }
                }
            }
        }
        if action_back {
            self.close_learning_session();
        }
    }

    /// Starts a learning session with cards due for review
    fn start_learning_session(&mut self, deck_index: usize) {
        let Some(deck_name) = self.all_decks.decks.get(deck_index).map(|d| d.name.clone()) else {
            return;
        };

        match LearningSession::start(&deck_name, Arc::clone(&self.conn), &self.config) {
            Ok(Some(session)) => {
                self.learning_session = Some(session);
                self.current_screen = AppScreen::LearningSession;
            }
            Ok(None) => self.show_result(format!("No cards in '{}' are due today.", deck_name)),
            Err(e) => self.report("Failed to start session", e),
        }
    }

    fn close_learning_session(&mut self) {
        if let Some(mut session) = self.learning_session.take() {
            if let Err(e) = session.finish() {
                self.report("Failed to close study session", e);
            }
        }
        self.current_screen = AppScreen::Main;
        self.refresh();
    }

    /// Handles deck export to JSON file
    fn handle_export(&mut self, deck_index: usize) {
        self.show_export_dialog = false;
        let Some(deck) = self.all_decks.decks.get(deck_index).cloned() else {
            return;
        };

        if let Some(path) = rfd::FileDialog::new()
            .set_file_name(format!("{}.json", deck.name))
            .add_filter("JSON files", &["json"])
            .save_file()
        {
            match export_json_to_path(&deck, &path) {
                Ok(()) => self.show_result(format!("Deck '{}' exported successfully!", deck.name)),
                Err(e) => self.report("Export failed", e),
            }
        }
    }

    /// Handles deck import from JSON file
    fn handle_import(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON files", &["json"])
            .pick_file()
        else {
            return;
        };

        let deck = match import_json(&path) {
            Ok(deck) => deck,
            Err(e) => {
                self.show_result(format!(
                    "Import failed: {}\n\nPlease check if the file has correct structure:\n{{\n  \"name\": \"Deck Name\",\n  \"flashcards\": [{{\"front\": \"...\", \"back\": \"...\"}}]\n}}",
                    e
                ));
                return;
            }
        };

        if self.all_decks.contains(&deck.name) {
            self.show_result(format!(
                "Deck '{}' already exists! Please rename it in the JSON file.",
                deck.name
            ));
            return;
        }

        let stored = lock(&self.conn).and_then(|conn| db::add_deck(&deck, &self.config.user_id, &conn));
        match stored {
            Ok(count) => {
                self.refresh();
                self.show_result(format!(
                    "Deck '{}' imported successfully with {} cards!",
                    deck.name, count
                ));
            }
            Err(e) => self.report("Failed to import deck", e),
        }
    }
}
