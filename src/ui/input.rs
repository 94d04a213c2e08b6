//! Keyboard input handling for the TUI.
//!
//! This module translates keyboard events into application state changes,
//! dispatching on the route the guard last resolved.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{
    can_add_password_char, can_add_question_char, can_add_username_char, App, HomeFocus,
    LoginFocus,
};
use crate::router::Route;

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.router.current() {
        Route::Root | Route::Login => handle_login_input(app, key).await,
        Route::Home => handle_home_input(app, key).await,
    }
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            // Quit from the login view
            return Ok(true);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::Username,
            };
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Username => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::Username,
                LoginFocus::Button => LoginFocus::Password,
            };
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Username => {
                app.login_focus = LoginFocus::Password;
            }
            LoginFocus::Password => {
                app.login_focus = LoginFocus::Button;
            }
            LoginFocus::Button => {
                // On success the router has moved to home;
                // on failure login_error is set for the overlay
                let _ = app.attempt_login().await;
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Username => {
                app.login_username.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            LoginFocus::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Username => {
                if can_add_username_char(app.login_username.len()) {
                    app.login_username.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.len()) {
                    app.login_password.push(c);
                }
            }
            LoginFocus::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

async fn handle_home_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // The query box owns character input while focused
    if app.home_focus == HomeFocus::Query {
        match key.code {
            KeyCode::Esc => app.home_focus = HomeFocus::KnowledgeBases,
            KeyCode::Tab => app.home_focus = HomeFocus::Results,
            KeyCode::BackTab => app.home_focus = HomeFocus::KnowledgeBases,
            KeyCode::Enter => app.submit_query(),
            KeyCode::Backspace => {
                app.question.pop();
            }
            KeyCode::Char(c) => {
                if can_add_question_char(app.question.len()) {
                    app.question.push(c);
                }
            }
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
        KeyCode::Char('r') => app.refresh_knowledge_bases(),
        KeyCode::Char('l') => app.logout().await,
        KeyCode::Tab => {
            app.home_focus = match app.home_focus {
                HomeFocus::KnowledgeBases => HomeFocus::Query,
                HomeFocus::Query => HomeFocus::Results,
                HomeFocus::Results => HomeFocus::KnowledgeBases,
            };
        }
        KeyCode::BackTab => {
            app.home_focus = match app.home_focus {
                HomeFocus::KnowledgeBases => HomeFocus::Results,
                HomeFocus::Query => HomeFocus::KnowledgeBases,
                HomeFocus::Results => HomeFocus::Query,
            };
        }
        KeyCode::Enter => {
            if app.home_focus == HomeFocus::KnowledgeBases {
                app.home_focus = HomeFocus::Query;
            }
        }
        KeyCode::Up => match app.home_focus {
            HomeFocus::KnowledgeBases => {
                app.kb_selection = app.kb_selection.saturating_sub(1);
            }
            HomeFocus::Results => {
                app.result_selection = app.result_selection.saturating_sub(1);
            }
            HomeFocus::Query => {}
        },
        KeyCode::Down => match app.home_focus {
            HomeFocus::KnowledgeBases => {
                if app.kb_selection + 1 < app.knowledge_bases.len() {
                    app.kb_selection += 1;
                }
            }
            HomeFocus::Results => {
                if app.result_selection + 1 < app.results.len() {
                    app.result_selection += 1;
                }
            }
            HomeFocus::Query => {}
        },
        _ => {}
    }
    Ok(false)
}
