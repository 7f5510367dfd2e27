//! The action boundary: runs one paid action and reports the result to the user.

use crate::coordinator::{ActionCoordinator, ActionError};
use crate::cost::Action;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::error;

/// Name of the credit token shown in dialogs.
pub const TOKEN_SYMBOL: &str = "MediToken";

/// Blocking dialogs used to talk to the user.
pub trait Prompt: Send + Sync {
    /// Shows `message` and waits for acknowledgement.
    fn alert(&self, message: &str);

    /// Asks `question`; `None` when the user dismisses the dialog.
    fn prompt(&self, question: &str) -> Option<String>;
}

/// Menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    /// Overwrite the open sheet.
    Save,
    /// Save under a new name (prompts for the name).
    SaveAs,
    /// Print the open sheet.
    Print,
    /// Store the open sheet and switch to a blank one.
    NewFile,
}

/// What a menu entry produced when it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// Printable HTML.
    Printed(String),
    /// The named file was updated.
    Saved(String),
    /// The sheet was stored under a new name and pinned.
    SavedAs {
        /// New file name.
        name: String,
        /// Content identifier of the upload.
        cid: String,
    },
    /// The user dismissed the save-as prompt.
    Cancelled,
    /// A blank sheet is open.
    NewFile,
}

/// Menu bound to a coordinator and a dialog implementation.
pub struct Menu {
    coordinator: Arc<ActionCoordinator>,
    prompt: Arc<dyn Prompt>,
}

impl Menu {
    /// Menu driving `coordinator`, reporting through `prompt`.
    pub fn new(coordinator: Arc<ActionCoordinator>, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            coordinator,
            prompt,
        }
    }

    /// Coordinator behind the menu.
    pub fn coordinator(&self) -> &Arc<ActionCoordinator> {
        &self.coordinator
    }

    /// Balance line displayed under the menu buttons.
    pub fn balance_label(&self) -> String {
        format!(
            "Tokens you Own: {}",
            self.coordinator.balance().format_fixed(2)
        )
    }

    /// Runs `item`. Errors are logged and shown; they never escape.
    pub async fn run(&self, item: MenuItem) -> Option<MenuOutcome> {
        match self.execute(item).await {
            Ok(outcome) => {
                if let Some(message) = success_message(&outcome) {
                    self.prompt.alert(&message);
                }
                Some(outcome)
            }
            Err(err) => {
                error!(item = ?item, error = %err, "menu action failed");
                self.prompt.alert(&failure_message(item, &err));
                None
            }
        }
    }

    async fn execute(&self, item: MenuItem) -> Result<MenuOutcome, ActionError> {
        match item {
            MenuItem::Print => self.coordinator.print().await.map(MenuOutcome::Printed),
            MenuItem::Save => {
                let record = self.coordinator.save().await?;
                Ok(MenuOutcome::Saved(record.name))
            }
            MenuItem::SaveAs => {
                let name = self.prompt.prompt("Enter filename:");
                Ok(match self.coordinator.save_as(name.as_deref()).await? {
                    Some(saved) => MenuOutcome::SavedAs {
                        name: saved.record.name,
                        cid: saved.cid.0,
                    },
                    None => MenuOutcome::Cancelled,
                })
            }
            MenuItem::NewFile => {
                self.coordinator.new_file().await?;
                Ok(MenuOutcome::NewFile)
            }
        }
    }
}

fn success_message(outcome: &MenuOutcome) -> Option<String> {
    match outcome {
        MenuOutcome::Saved(name) => Some(format!("File {name} updated successfully!")),
        MenuOutcome::SavedAs { name, cid } => Some(format!(
            "File \"{name}\" saved successfully! IPFS CID: {cid}"
        )),
        MenuOutcome::Printed(_) | MenuOutcome::Cancelled | MenuOutcome::NewFile => None,
    }
}

/// Dialog text for a failed menu action.
pub fn failure_message(item: MenuItem, err: &ActionError) -> String {
    match err {
        ActionError::InsufficientBalance {
            action, required, ..
        } => format!(
            "You need at least {required} {TOKEN_SYMBOL} to {}",
            action.verb()
        ),
        ActionError::DefaultFileReadOnly => "Cannot update default file!".to_string(),
        ActionError::InvalidFilename(name) => format!("Invalid filename: {name}"),
        ActionError::Network(_) | ActionError::Chain(_) if item != MenuItem::SaveAs => {
            "Failed to process token payment".to_string()
        }
        other => match item {
            MenuItem::Print => format!("Failed to print: {other}"),
            MenuItem::NewFile => format!("Failed to open a new file: {other}"),
            MenuItem::Save | MenuItem::SaveAs => format!("Error saving file: {other}"),
        },
    }
}

impl From<Action> for MenuItem {
    fn from(action: Action) -> Self {
        match action {
            Action::Print => MenuItem::Print,
            Action::Save => MenuItem::Save,
            Action::SaveAs => MenuItem::SaveAs,
        }
    }
}

/// Dialogs on stdin/stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn alert(&self, message: &str) {
        println!("{message}");
    }

    fn prompt(&self, question: &str) -> Option<String> {
        print!("{question} ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).ok()?;
        if read == 0 {
            return None;
        }
        let answer = line.trim_end_matches(['\r', '\n']).to_string();
        Some(answer)
    }
}
