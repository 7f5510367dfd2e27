#![deny(missing_docs)]

//! # medisheet
//!
//! Pay-per-action coordination for a medical invoice spreadsheet. Printing,
//! saving and "save as" each cost a configurable number of credit tokens that
//! are transferred from the user's wallet to the invoice contract of the
//! network the wallet is connected to. Save-as additionally pins the sheet as a
//! JSON document with a content-addressed store.
//!
//! ## Layout
//!
//! * [`coordinator`] holds [`ActionCoordinator`], the balance gate and the
//!   print/save/save-as/new-file flows.
//! * [`network`] maps chain ids to contract addresses; [`cost`] holds the
//!   per-action price table; [`filename`] validates user supplied names.
//! * [`chain`], [`content`], [`store`] and [`workbook`] are the seams to the
//!   wallet, the upload service, the local file store and the spreadsheet.
//!   [`ledger`] and [`content::MemoryContentStore`] implement the first two
//!   in memory; the `net` feature adds JSON-RPC and HTTP implementations.
//! * [`menu`] is the user facing boundary that turns errors into dialogs.
//!
//! ## Usage
//!
//! ```rust
//! use medisheet::{validate_name, Action, CostTable, TokenAmount};
//!
//! let costs = CostTable::default();
//! assert_eq!(costs.cost(Action::SaveAs), TokenAmount::from_whole(1));
//! assert!(validate_name("march invoices"));
//! assert!(!validate_name("default"));
//! ```

pub mod amount;
pub mod chain;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod cost;
pub mod filename;
pub mod ledger;
pub mod menu;
pub mod network;
pub mod store;
pub mod watch;
pub mod workbook;

#[cfg(feature = "net")]
pub mod net;

pub use amount::{AmountParseError, TokenAmount, TOKEN_DECIMALS};
pub use chain::{Address, ChainClient, ChainError, Receipt, TxHash};
pub use config::{Config, ConfigError};
pub use content::{
    cid_v1_raw, upload_sheet, ContentId, ContentStore, MemoryContentStore, SheetPayload,
    StorageAccount, UploadError, UploadFile,
};
pub use coordinator::{ActionCoordinator, ActionError, CoordinatorSettings, SavedAs};
pub use cost::{Action, CostTable};
pub use filename::{trim_name, validate_name, DEFAULT_FILE, MAX_NAME_LEN, UNTITLED_FILE};
pub use ledger::MemoryLedger;
pub use menu::{failure_message, Menu, MenuItem, MenuOutcome, Prompt, TerminalPrompt};
pub use network::{known_chain, KnownChain, NetworkError, NetworkProfile, NetworkTable};
pub use store::{FileRecord, FileStore, LocalStore, MemoryStore, StoreError};
pub use watch::spawn_chain_watcher;
pub use workbook::{SheetFile, Workbook, BLANK_SHEET};
