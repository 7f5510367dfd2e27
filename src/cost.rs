//! Paid actions and the credit cost of each one.

use crate::amount::TokenAmount;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-triggered actions that consume credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Render the current sheet for printing.
    Print,
    /// Overwrite the selected sheet.
    Save,
    /// Store the sheet under a new name and pin it remotely.
    SaveAs,
}

impl Action {
    /// All paid actions.
    pub const ALL: [Action; 3] = [Action::Print, Action::Save, Action::SaveAs];

    /// Cost table key.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Print => "PRINT",
            Action::Save => "SAVE",
            Action::SaveAs => "SAVE_AS",
        }
    }

    /// Verb used in balance prompts ("... to print").
    pub fn verb(self) -> &'static str {
        match self {
            Action::Print => "print",
            Action::Save | Action::SaveAs => "save",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credit required per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTable {
    /// Cost of [`Action::Print`].
    #[serde(rename = "PRINT")]
    pub print: TokenAmount,
    /// Cost of [`Action::Save`].
    #[serde(rename = "SAVE")]
    pub save: TokenAmount,
    /// Cost of [`Action::SaveAs`].
    #[serde(rename = "SAVE_AS")]
    pub save_as: TokenAmount,
}

impl CostTable {
    /// Credit needed for `action`.
    pub fn cost(&self, action: Action) -> TokenAmount {
        match action {
            Action::Print => self.print,
            Action::Save => self.save,
            Action::SaveAs => self.save_as,
        }
    }

    /// `true` when `balance` covers `action`.
    pub fn affordable(&self, action: Action, balance: TokenAmount) -> bool {
        balance >= self.cost(action)
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            print: TokenAmount::from_whole(1),
            save: TokenAmount::from_whole(1),
            save_as: TokenAmount::from_whole(1),
        }
    }
}
