//! Paid-action orchestration.
//!
//! Every paid action follows the same sequence: check the cached credit
//! balance against the cost table, debit it with an on-chain transfer to the
//! invoice contract, and only after the transfer is confirmed run the action's
//! remaining effects. Effects that already completed are never rolled back; a
//! confirmed debit stays spent if a later upload or save fails.

use crate::amount::TokenAmount;
use crate::chain::{ChainClient, ChainError, Receipt};
use crate::content::{upload_sheet, ContentId, ContentStore, SheetPayload, StorageAccount, UploadError};
use crate::cost::{Action, CostTable};
use crate::filename::{trim_name, validate_name, DEFAULT_FILE};
use crate::network::{NetworkError, NetworkProfile, NetworkTable};
use crate::store::{encode_content, FileRecord, FileStore, StoreError};
use crate::workbook::{Workbook, BLANK_SHEET};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Failures of a single paid action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Cached balance does not cover the action. Nothing was attempted.
    #[error("insufficient balance for {action}: need {required}, have {balance}")]
    InsufficientBalance {
        /// Action that was refused.
        action: Action,
        /// Cost table entry.
        required: TokenAmount,
        /// Balance at the time of the check.
        balance: TokenAmount,
    },
    /// The scratch sheet cannot be saved in place.
    #[error("cannot update default file")]
    DefaultFileReadOnly,
    /// Save-as name failed validation.
    #[error("invalid filename `{0}`")]
    InvalidFilename(String),
    /// The wallet's chain is not in the network table.
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// A wallet or contract call failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Uploading the sheet failed.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// Local persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reading or loading the open sheet failed.
    #[error("workbook error: {0}")]
    Workbook(String),
}

impl ActionError {
    /// `true` for refusals decided before any remote call was made.
    pub fn is_precheck(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. } | Self::DefaultFileReadOnly | Self::InvalidFilename(_)
        )
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        Self::Workbook(err.to_string())
    }
}

/// Result of a successful save-as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedAs {
    /// Record written to the local store.
    pub record: FileRecord,
    /// Identifier of the uploaded directory.
    pub cid: ContentId,
}

/// Static inputs of a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Supported networks.
    pub networks: NetworkTable,
    /// Credit cost per action.
    pub costs: CostTable,
    /// Upload account; uploads fail when absent.
    pub storage: Option<StorageAccount>,
}

#[derive(Debug)]
struct SessionState {
    balance: TokenAmount,
    selected: String,
}

/// Runs paid actions against the injected collaborators.
pub struct ActionCoordinator {
    chain: Arc<dyn ChainClient>,
    content: Arc<dyn ContentStore>,
    files: Arc<dyn FileStore>,
    workbook: Arc<dyn Workbook>,
    settings: CoordinatorSettings,
    state: Mutex<SessionState>,
}

impl ActionCoordinator {
    /// Coordinator with a zero cached balance and `selected` as the open file.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        content: Arc<dyn ContentStore>,
        files: Arc<dyn FileStore>,
        workbook: Arc<dyn Workbook>,
        settings: CoordinatorSettings,
        selected: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            content,
            files,
            workbook,
            settings,
            state: Mutex::new(SessionState {
                balance: TokenAmount::ZERO,
                selected: selected.into(),
            }),
        }
    }

    /// Last known credit balance.
    pub fn balance(&self) -> TokenAmount {
        self.with_state(|state| state.balance)
    }

    /// Name of the open file.
    pub fn selected_file(&self) -> String {
        self.with_state(|state| state.selected.clone())
    }

    /// Marks `name` as the open file.
    pub fn select_file(&self, name: impl Into<String>) {
        let name = name.into();
        self.with_state(move |state| state.selected = name);
    }

    /// Cost table in use.
    pub fn costs(&self) -> &CostTable {
        &self.settings.costs
    }

    /// Supported networks.
    pub fn networks(&self) -> &NetworkTable {
        &self.settings.networks
    }

    /// Resolves the wallet's current chain to a profile.
    pub async fn active_network(&self) -> Result<NetworkProfile, ActionError> {
        let chain_id = self.chain.chain_id().await?;
        let profile = self.settings.networks.resolve(chain_id)?;
        Ok(profile.clone())
    }

    /// Re-reads the credit balance from the invoice contract of the active network.
    pub async fn refresh_balance(&self) -> Result<TokenAmount, ActionError> {
        let profile = self.active_network().await?;
        let balance = self.chain.user_tokens(&profile.invoice_address).await?;
        self.with_state(|state| state.balance = balance);
        debug!(network = %profile.name, balance = %balance, "balance refreshed");
        Ok(balance)
    }

    /// Handles a wallet chain switch by refreshing the balance.
    pub async fn on_chain_changed(&self, chain_id: u64) -> Result<TokenAmount, ActionError> {
        info!(chain_id, "network changed");
        self.refresh_balance().await
    }

    /// Debits PRINT and returns the printable sheet.
    pub async fn print(&self) -> Result<String, ActionError> {
        self.ensure_affordable(Action::Print)?;
        self.debit(Action::Print).await?;
        let html = self.workbook.html_content()?;
        info!(action = %Action::Print, bytes = html.len(), "sheet rendered for print");
        Ok(html)
    }

    /// Debits SAVE and overwrites the open file with the current sheet.
    pub async fn save(&self) -> Result<FileRecord, ActionError> {
        let name = self.selected_file();
        if name == DEFAULT_FILE {
            return Err(ActionError::DefaultFileReadOnly);
        }
        self.ensure_affordable(Action::Save)?;
        self.debit(Action::Save).await?;

        let record = self.snapshot_open_file(&name)?;
        self.files.save(record.clone())?;
        self.select_file(name.clone());
        info!(action = %Action::Save, file = %name, "file updated");
        Ok(record)
    }

    /// Debits SAVE_AS, uploads the sheet, and stores it under `name`.
    ///
    /// A missing or empty name cancels the action and returns `Ok(None)`.
    pub async fn save_as(&self, name: Option<&str>) -> Result<Option<SavedAs>, ActionError> {
        let Some(raw) = name.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        self.ensure_affordable(Action::SaveAs)?;
        if !validate_name(raw) {
            return Err(ActionError::InvalidFilename(raw.to_string()));
        }
        let name = trim_name(raw).to_string();
        let content = encode_content(&self.workbook.spreadsheet_content()?);

        self.debit(Action::SaveAs).await?;

        let now = Utc::now();
        let payload = SheetPayload {
            name: name.clone(),
            content: content.clone(),
            created: now,
            modified: now,
        };
        let cid = upload_sheet(
            self.content.as_ref(),
            self.settings.storage.as_ref(),
            &payload,
        )
        .await?;
        info!(action = %Action::SaveAs, file = %name, cid = %cid, "sheet uploaded");

        let record = FileRecord {
            created: payload.created,
            modified: payload.modified,
            content,
            name: name.clone(),
        };
        self.files.save(record.clone())?;
        self.select_file(name);
        Ok(Some(SavedAs { record, cid }))
    }

    /// Stores the open file (free of charge) and switches to a blank scratch sheet.
    pub async fn new_file(&self) -> Result<(), ActionError> {
        let name = self.selected_file();
        if name != DEFAULT_FILE {
            let record = self.snapshot_open_file(&name)?;
            self.files.save(record)?;
            debug!(file = %name, "open file stored before switching");
        }
        self.workbook.view_file(DEFAULT_FILE, BLANK_SHEET)?;
        self.select_file(DEFAULT_FILE);
        Ok(())
    }

    /// Refreshes the balance every time `chain_ids` reports a new chain.
    pub fn follow_chain(self: Arc<Self>, mut chain_ids: watch::Receiver<Option<u64>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while chain_ids.changed().await.is_ok() {
                let current = *chain_ids.borrow_and_update();
                let Some(chain_id) = current else {
                    continue;
                };
                if let Err(err) = self.on_chain_changed(chain_id).await {
                    error!(chain_id, error = %err, "error fetching user tokens");
                }
            }
        })
    }

    fn ensure_affordable(&self, action: Action) -> Result<TokenAmount, ActionError> {
        let required = self.settings.costs.cost(action);
        let balance = self.balance();
        if !self.settings.costs.affordable(action, balance) {
            return Err(ActionError::InsufficientBalance {
                action,
                required,
                balance,
            });
        }
        Ok(required)
    }

    async fn debit(&self, action: Action) -> Result<Receipt, ActionError> {
        let amount = self.settings.costs.cost(action);
        let profile = self.active_network().await?;
        let tx = self
            .chain
            .transfer(&profile.token_address, &profile.invoice_address, amount)
            .await?;
        debug!(action = %action, network = %profile.name, tx = %tx, "debit submitted");
        let receipt = self.chain.wait_for_receipt(&tx).await?;
        if !receipt.success {
            return Err(ChainError::Reverted(tx).into());
        }
        info!(
            action = %action,
            network = %profile.name,
            tx = %tx,
            block = receipt.block_number,
            amount = %amount,
            "debit confirmed"
        );
        if let Err(err) = self.refresh_balance().await {
            warn!(error = %err, "balance refresh after debit failed; decaying cached balance");
            self.with_state(|state| state.balance = state.balance.saturating_sub(amount));
        }
        Ok(receipt)
    }

    fn snapshot_open_file(&self, name: &str) -> Result<FileRecord, ActionError> {
        let content = encode_content(&self.workbook.spreadsheet_content()?);
        let now = Utc::now();
        let created = self
            .files
            .get(name)?
            .map(|existing| existing.created)
            .unwrap_or(now);
        Ok(FileRecord {
            created,
            modified: now,
            content,
            name: name.to_string(),
        })
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Address, TxHash};
    use crate::content::{MemoryContentStore, UploadFile};
    use crate::ledger::MemoryLedger;
    use crate::store::{decode_content, MemoryStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const AMOY: u64 = 80_002;
    const CALIBRATION: u64 = 314_159;

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn tokens(n: u64) -> TokenAmount {
        TokenAmount::from_whole(n)
    }

    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<&'static str>>>);

    impl CallLog {
        fn push(&self, call: &'static str) {
            self.0.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, call: &str) -> usize {
            self.calls().iter().filter(|c| **c == call).count()
        }

        fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    struct ScriptedChain {
        ledger: MemoryLedger,
        log: CallLog,
        revert: AtomicBool,
        fail_reads: AtomicBool,
    }

    #[async_trait]
    impl ChainClient for ScriptedChain {
        async fn chain_id(&self) -> Result<u64, ChainError> {
            self.log.push("chain_id");
            self.ledger.chain_id().await
        }

        fn account(&self) -> Address {
            self.ledger.account()
        }

        async fn user_tokens(&self, invoice: &Address) -> Result<TokenAmount, ChainError> {
            self.log.push("user_tokens");
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(ChainError::Transport("connection reset".into()));
            }
            self.ledger.user_tokens(invoice).await
        }

        async fn transfer(
            &self,
            token: &Address,
            to: &Address,
            amount: TokenAmount,
        ) -> Result<TxHash, ChainError> {
            self.log.push("transfer");
            self.ledger.transfer(token, to, amount).await
        }

        async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt, ChainError> {
            self.log.push("wait_for_receipt");
            let mut receipt = self.ledger.wait_for_receipt(tx).await?;
            if self.revert.load(Ordering::SeqCst) {
                receipt.success = false;
            }
            Ok(receipt)
        }
    }

    struct RecordingContent {
        inner: MemoryContentStore,
        log: CallLog,
        fail_upload: AtomicBool,
    }

    #[async_trait]
    impl ContentStore for RecordingContent {
        async fn login(&self, email: &str) -> Result<(), UploadError> {
            self.log.push("login");
            self.inner.login(email).await
        }

        async fn select_space(&self, space: &str) -> Result<(), UploadError> {
            self.log.push("select_space");
            self.inner.select_space(space).await
        }

        async fn upload_directory(&self, files: Vec<UploadFile>) -> Result<ContentId, UploadError> {
            self.log.push("upload");
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(UploadError::Remote("gateway timeout".into()));
            }
            self.inner.upload_directory(files).await
        }
    }

    struct RecordingFiles {
        inner: MemoryStore,
        log: CallLog,
    }

    impl FileStore for RecordingFiles {
        fn get(&self, name: &str) -> Result<Option<FileRecord>, StoreError> {
            self.log.push("files.get");
            self.inner.get(name)
        }

        fn save(&self, record: FileRecord) -> Result<(), StoreError> {
            self.log.push("files.save");
            self.inner.save(record)
        }

        fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
            self.inner.list()
        }
    }

    #[derive(Default)]
    struct MemoryWorkbook {
        content: Mutex<String>,
        shown: Mutex<Option<String>>,
    }

    impl Workbook for MemoryWorkbook {
        fn spreadsheet_content(&self) -> io::Result<String> {
            Ok(self.content.lock().unwrap().clone())
        }

        fn html_content(&self) -> io::Result<String> {
            Ok(format!("<table>{}</table>", self.content.lock().unwrap()))
        }

        fn view_file(&self, name: &str, content: &str) -> io::Result<()> {
            *self.content.lock().unwrap() = content.to_string();
            *self.shown.lock().unwrap() = Some(name.to_string());
            Ok(())
        }
    }

    struct Fixture {
        log: CallLog,
        chain: Arc<ScriptedChain>,
        content: Arc<RecordingContent>,
        files: Arc<RecordingFiles>,
        workbook: Arc<MemoryWorkbook>,
        coordinator: Arc<ActionCoordinator>,
    }

    fn profile(name: &str, chain_id: u64) -> NetworkProfile {
        NetworkProfile {
            name: name.to_string(),
            chain_id,
            token_address: addr('e'),
            invoice_address: addr('f'),
            rpc_url: None,
        }
    }

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            networks: NetworkTable::new(vec![
                profile("polygonAmoy", AMOY),
                profile("filecoinCalibration", CALIBRATION),
            ])
            .unwrap(),
            costs: CostTable {
                print: tokens(1),
                save: tokens(1),
                save_as: tokens(2),
            },
            storage: Some(StorageAccount {
                email: "billing@clinic.example".into(),
                space: "did:key:z6MkClinic".into(),
            }),
        }
    }

    async fn fixture_with(funds: u64, settings: CoordinatorSettings, selected: &str) -> Fixture {
        let log = CallLog::default();
        let ledger = MemoryLedger::new(addr('a'), AMOY);
        ledger.fund(AMOY, &addr('a'), tokens(funds)).unwrap();
        let chain = Arc::new(ScriptedChain {
            ledger,
            log: log.clone(),
            revert: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        });
        let content = Arc::new(RecordingContent {
            inner: MemoryContentStore::new(),
            log: log.clone(),
            fail_upload: AtomicBool::new(false),
        });
        let files = Arc::new(RecordingFiles {
            inner: MemoryStore::new(),
            log: log.clone(),
        });
        let workbook = Arc::new(MemoryWorkbook::default());
        *workbook.content.lock().unwrap() = "cell:A1:v:42".to_string();
        let coordinator = Arc::new(ActionCoordinator::new(
            chain.clone(),
            content.clone(),
            files.clone(),
            workbook.clone(),
            settings,
            selected,
        ));
        coordinator.refresh_balance().await.unwrap();
        log.clear();
        Fixture {
            log,
            chain,
            content,
            files,
            workbook,
            coordinator,
        }
    }

    async fn fixture(funds: u64) -> Fixture {
        fixture_with(funds, settings(), "invoice-march").await
    }

    #[tokio::test]
    async fn insufficient_balance_issues_no_remote_calls() {
        let fx = fixture(1).await;
        let err = fx.coordinator.save_as(Some("new sheet")).await.unwrap_err();
        assert_eq!(
            err,
            ActionError::InsufficientBalance {
                action: Action::SaveAs,
                required: tokens(2),
                balance: tokens(1),
            }
        );

        let broke = fixture(0).await;
        assert!(matches!(
            broke.coordinator.print().await,
            Err(ActionError::InsufficientBalance { action: Action::Print, .. })
        ));
        assert!(matches!(
            broke.coordinator.save().await,
            Err(ActionError::InsufficientBalance { action: Action::Save, .. })
        ));

        assert!(fx.log.calls().is_empty());
        assert!(broke.log.calls().is_empty());
        assert!(err.is_precheck());
    }

    #[tokio::test]
    async fn balance_check_precedes_name_validation() {
        let fx = fixture(0).await;
        let err = fx.coordinator.save_as(Some("bad/name")).await.unwrap_err();
        assert!(matches!(err, ActionError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn unsupported_network_blocks_contract_calls() {
        let fx = fixture(5).await;
        fx.chain.ledger.switch_chain(1).unwrap();

        let err = fx.coordinator.save().await.unwrap_err();
        assert_eq!(err, ActionError::Network(NetworkError::Unsupported { chain_id: 1 }));
        assert_eq!(fx.log.calls(), ["chain_id"]);

        let refresh = fx.coordinator.refresh_balance().await.unwrap_err();
        assert!(matches!(refresh, ActionError::Network(_)));
        assert_eq!(fx.log.count("user_tokens"), 0);
        assert_eq!(fx.coordinator.balance(), tokens(5));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]
        #[test]
        fn unlisted_chain_makes_no_contract_calls(chain_id in any::<u64>()) {
            prop_assume!(chain_id != AMOY && chain_id != CALIBRATION);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let fx = fixture(5).await;
                fx.chain.ledger.switch_chain(chain_id).unwrap();
                let unsupported = ActionError::Network(NetworkError::Unsupported { chain_id });

                assert_eq!(fx.coordinator.print().await, Err(unsupported.clone()));
                assert_eq!(fx.coordinator.save().await.unwrap_err(), unsupported.clone());
                assert_eq!(
                    fx.coordinator.save_as(Some("may claims")).await.unwrap_err(),
                    unsupported.clone()
                );
                assert_eq!(fx.coordinator.refresh_balance().await, Err(unsupported));
                assert_eq!(fx.log.count("user_tokens"), 0);
                assert_eq!(fx.log.count("transfer"), 0);
                assert_eq!(fx.log.count("upload"), 0);
                assert_eq!(fx.coordinator.balance(), tokens(5));
            });
        }
    }

    #[tokio::test]
    async fn exact_balance_covers_the_cost() {
        let fx = fixture(2).await;
        let saved = fx.coordinator.save_as(Some("june claims")).await.unwrap();
        assert!(saved.is_some());
        assert_eq!(fx.coordinator.balance(), TokenAmount::ZERO);
    }

    #[tokio::test]
    async fn save_as_uploads_then_persists_once() {
        let fx = fixture(5).await;
        let saved = fx
            .coordinator
            .save_as(Some("  april claims "))
            .await
            .unwrap()
            .expect("not cancelled");

        assert_eq!(
            fx.log.calls(),
            [
                "chain_id",
                "transfer",
                "wait_for_receipt",
                "chain_id",
                "user_tokens",
                "login",
                "select_space",
                "upload",
                "files.save",
            ]
        );
        assert_eq!(fx.log.count("upload"), 1);
        assert_eq!(fx.log.count("files.save"), 1);

        assert_eq!(saved.record.name, "april claims");
        assert_eq!(decode_content(&saved.record.content).unwrap(), "cell:A1:v:42");
        assert!(saved.cid.0.starts_with('b'));
        assert_eq!(fx.coordinator.balance(), tokens(3));
        assert_eq!(fx.coordinator.selected_file(), "april claims");
        assert_eq!(fx.files.inner.get("april claims").unwrap(), Some(saved.record));
        let uploaded = fx.content.inner.fetch(&saved.cid).unwrap();
        assert_eq!(uploaded[0].name, "april claims.json");
    }

    #[tokio::test]
    async fn failed_upload_keeps_debit_and_skips_persistence() {
        let fx = fixture(5).await;
        fx.content.fail_upload.store(true, Ordering::SeqCst);

        let err = fx.coordinator.save_as(Some("april")).await.unwrap_err();
        assert_eq!(err, ActionError::Upload(UploadError::Remote("gateway timeout".into())));
        assert_eq!(fx.coordinator.balance(), tokens(3));
        assert_eq!(fx.chain.ledger.balance_of(AMOY, &addr('f')), tokens(2));
        assert_eq!(fx.log.count("files.save"), 0);
        assert_eq!(fx.files.inner.get("april").unwrap(), None);
        assert_eq!(fx.coordinator.selected_file(), "invoice-march");
    }

    #[tokio::test]
    async fn missing_storage_account_fails_after_debit() {
        let mut no_storage = settings();
        no_storage.storage = None;
        let fx = fixture_with(5, no_storage, "invoice-march").await;
        let err = fx.coordinator.save_as(Some("april")).await.unwrap_err();
        assert_eq!(err, ActionError::Upload(UploadError::NotConfigured));
        assert_eq!(fx.coordinator.balance(), tokens(3));
        assert_eq!(fx.log.count("login"), 0);
    }

    #[tokio::test]
    async fn save_as_cancel_and_invalid_names() {
        let fx = fixture(5).await;
        assert_eq!(fx.coordinator.save_as(None).await, Ok(None));
        assert_eq!(fx.coordinator.save_as(Some("")).await, Ok(None));
        assert_eq!(
            fx.coordinator.save_as(Some("Untitled")).await,
            Err(ActionError::InvalidFilename("Untitled".into()))
        );
        assert!(fx.log.calls().is_empty());
        assert_eq!(fx.coordinator.balance(), tokens(5));
    }

    #[tokio::test]
    async fn default_file_cannot_be_saved() {
        let fx = fixture_with(5, settings(), DEFAULT_FILE).await;
        assert_eq!(fx.coordinator.save().await, Err(ActionError::DefaultFileReadOnly));
        assert!(fx.log.calls().is_empty());
    }

    #[tokio::test]
    async fn save_preserves_created_timestamp() {
        let fx = fixture(5).await;
        let created = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
        fx.files
            .inner
            .save(FileRecord::new("invoice-march", "old", created))
            .unwrap();

        let record = fx.coordinator.save().await.unwrap();
        assert_eq!(record.created, created);
        assert!(record.modified > created);
        assert_eq!(decode_content(&record.content).unwrap(), "cell:A1:v:42");
        assert_eq!(fx.coordinator.balance(), tokens(4));
        let calls = fx.log.calls();
        let debit_at = calls.iter().position(|c| *c == "wait_for_receipt").unwrap();
        let save_at = calls.iter().position(|c| *c == "files.save").unwrap();
        assert!(debit_at < save_at);
    }

    #[tokio::test]
    async fn save_without_record_creates_it() {
        let fx = fixture(5).await;
        let record = fx.coordinator.save().await.unwrap();
        assert_eq!(record.created, record.modified);
        assert_eq!(fx.files.inner.get("invoice-march").unwrap(), Some(record));
    }

    #[tokio::test]
    async fn print_debits_and_renders() {
        let fx = fixture(2).await;
        let html = fx.coordinator.print().await.unwrap();
        assert_eq!(html, "<table>cell:A1:v:42</table>");
        assert_eq!(fx.coordinator.balance(), tokens(1));
        assert_eq!(fx.log.count("files.save"), 0);
        assert_eq!(fx.log.count("upload"), 0);
    }

    #[tokio::test]
    async fn reverted_debit_stops_the_action() {
        let fx = fixture(5).await;
        fx.chain.revert.store(true, Ordering::SeqCst);
        let err = fx.coordinator.save().await.unwrap_err();
        assert!(matches!(err, ActionError::Chain(ChainError::Reverted(_))));
        assert_eq!(fx.log.count("files.save"), 0);
    }

    #[tokio::test]
    async fn failed_refresh_after_debit_decays_cached_balance() {
        let fx = fixture(5).await;
        fx.chain.fail_reads.store(true, Ordering::SeqCst);
        fx.coordinator.print().await.unwrap();
        assert_eq!(fx.coordinator.balance(), tokens(4));
    }

    #[tokio::test]
    async fn new_file_stores_open_sheet_for_free() {
        let fx = fixture(0).await;
        fx.coordinator.new_file().await.unwrap();

        let stored = fx.files.inner.get("invoice-march").unwrap().unwrap();
        assert_eq!(decode_content(&stored.content).unwrap(), "cell:A1:v:42");
        assert_eq!(fx.coordinator.selected_file(), DEFAULT_FILE);
        assert_eq!(fx.workbook.shown.lock().unwrap().as_deref(), Some(DEFAULT_FILE));
        assert_eq!(*fx.workbook.content.lock().unwrap(), BLANK_SHEET);
        assert_eq!(fx.log.count("transfer"), 0);

        fx.log.clear();
        fx.coordinator.new_file().await.unwrap();
        assert_eq!(fx.log.count("files.save"), 0);
    }

    #[tokio::test]
    async fn chain_switch_refreshes_balance() {
        let fx = fixture(5).await;
        fx.chain
            .ledger
            .fund(CALIBRATION, &addr('a'), tokens(9))
            .unwrap();
        let (tx, rx) = watch::channel(None);
        let handle = fx.coordinator.clone().follow_chain(rx);

        fx.chain.ledger.switch_chain(CALIBRATION).unwrap();
        tx.send(Some(CALIBRATION)).unwrap();
        for _ in 0..100 {
            if fx.coordinator.balance() == tokens(9) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fx.coordinator.balance(), tokens(9));

        drop(tx);
        handle.await.unwrap();
    }
}
