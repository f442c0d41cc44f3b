use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tether::WorkerSignal;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    Restart,
}

/// Spawn a thread that maps key presses onto the worker signal.
///
/// - Esc, `q`, `Q` or Ctrl+C: shut down
/// - `r` or `R`: drop the current session and reattach
pub fn spawn_keyboard_monitor(signal: Arc<WorkerSignal>) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !signal.is_shutdown() {
            // Poll with a timeout so shutdown from elsewhere is noticed
            if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            let Ok(Event::Key(key)) = event::read() else {
                continue;
            };
            match action_for(&key) {
                Some(KeyAction::Quit) => {
                    debug!("Shutdown key pressed: {:?}", key.code);
                    signal.trigger();
                    break;
                }
                Some(KeyAction::Restart) => {
                    info!("Restart requested from keyboard");
                    signal.request_restart();
                }
                None => {}
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

fn action_for(event: &KeyEvent) -> Option<KeyAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(KeyAction::Quit),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::Restart),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_keys() {
        for event in [
            KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('Q'), KeyModifiers::SHIFT),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            assert_eq!(action_for(&event), Some(KeyAction::Quit));
        }
    }

    #[test]
    fn test_restart_key() {
        let event = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE);
        assert_eq!(action_for(&event), Some(KeyAction::Restart));
    }

    #[test]
    fn test_other_keys_ignored() {
        assert_eq!(action_for(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)), None);
        assert_eq!(action_for(&KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)), None);
    }
}
