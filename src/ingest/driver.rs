//! Ingestion run: resolve the host, then scan each user's crontab and submit every
//! entry to the record store on its own.
//!
//! Only host resolution can fail the run. A user whose crontab cannot be read, a line
//! that does not tokenize into six fields, and a record the store rejects are each
//! logged and counted, and the run moves on.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::db::RecordStore;
use crate::error::Result;
use crate::host::HostIdentity;
use super::entry::{EmptyCommandPolicy, TaskEntry};
use super::scanner::{scan_file_with_timeout, TokenizedLine};

/// Everything a run needs, resolved from configuration
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub users: Vec<String>,
    pub spool_root: PathBuf,
    pub include_commented: bool,
    pub empty_command: EmptyCommandPolicy,
    pub host: HostIdentity,
    /// Stop starting new users once this much time has passed
    pub run_deadline: Option<Duration>,
    pub file_read_timeout: Option<Duration>,
}

impl ScanPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            users: config.scan.users.clone(),
            spool_root: config.spool_root().to_path_buf(),
            include_commented: config.scan.include_commented_entries,
            empty_command: config.scan.empty_command,
            host: HostIdentity::from_override(config.cronscan.host_name.as_deref()),
            run_deadline: config.scan.run_deadline_secs.map(Duration::from_secs),
            file_read_timeout: config.scan.file_read_timeout_ms.map(Duration::from_millis),
        }
    }

    /// `<spool_root>/<user>`
    pub fn crontab_path(&self, user: &str) -> PathBuf {
        self.spool_root.join(user)
    }
}

/// What happened to one user's crontab
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserOutcome {
    pub user: String,
    pub path: PathBuf,
    pub committed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the crontab could not be read; no entries were attempted
    pub access_error: Option<String>,
}

impl UserOutcome {
    fn new(user: &str, path: &Path) -> Self {
        Self {
            user: user.to_string(),
            path: path.to_path_buf(),
            ..Default::default()
        }
    }
}

/// Totals for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub host_name: String,
    pub users: Vec<UserOutcome>,
    /// The run deadline passed before every user was scanned
    pub deadline_reached: bool,
}

impl RunSummary {
    pub fn committed(&self) -> usize {
        self.users.iter().map(|u| u.committed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.users.iter().map(|u| u.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.users.iter().map(|u| u.failed).sum()
    }

    pub fn unreadable_users(&self) -> usize {
        self.users.iter().filter(|u| u.access_error.is_some()).count()
    }

    pub fn log(&self) {
        log::info!("=== Crontab Scan Complete ===");
        log::info!("Host: {}", self.host_name);
        for user in &self.users {
            match &user.access_error {
                Some(err) => log::info!("  {}: unreadable ({})", user.user, err),
                None => log::info!(
                    "  {}: committed {}, skipped {}, failed {}",
                    user.user,
                    user.committed,
                    user.skipped,
                    user.failed
                ),
            }
        }
        log::info!(
            "Entries committed: {}, skipped: {}, failed: {}",
            self.committed(),
            self.skipped(),
            self.failed()
        );
        if self.unreadable_users() > 0 {
            log::warn!("{} crontab(s) could not be read", self.unreadable_users());
        }
        if self.deadline_reached {
            log::warn!("Run deadline reached before all users were scanned");
        }
    }
}

enum EntryOutcome {
    Committed,
    Skipped,
    Failed,
}

/// Scan every planned user and submit their entries to `store`.
///
/// Users are processed in order and each user's entries in file order. Returns
/// `Err` only when the host identity cannot be resolved, before any user is scanned.
pub async fn run<S: RecordStore>(store: &S, plan: &ScanPlan) -> Result<RunSummary> {
    let host_name = plan.host.resolve()?;
    log::info!("Scanning {} user(s) on host {}", plan.users.len(), host_name);

    let started = Instant::now();
    let mut summary = RunSummary {
        host_name,
        ..Default::default()
    };

    for (idx, user) in plan.users.iter().enumerate() {
        if let Some(deadline) = plan.run_deadline {
            if started.elapsed() >= deadline {
                log::warn!(
                    "Run deadline of {:?} reached; {} user(s) not scanned",
                    deadline,
                    plan.users.len() - idx
                );
                summary.deadline_reached = true;
                break;
            }
        }

        log::info!("[{}/{}] Scanning crontab for {}", idx + 1, plan.users.len(), user);
        let outcome = ingest_user(store, plan, &summary.host_name, user).await;
        summary.users.push(outcome);
    }

    Ok(summary)
}

async fn ingest_user<S: RecordStore>(
    store: &S,
    plan: &ScanPlan,
    host_name: &str,
    user: &str,
) -> UserOutcome {
    let path = plan.crontab_path(user);
    let mut outcome = UserOutcome::new(user, &path);

    let lines = match scan_file_with_timeout(path.clone(), plan.include_commented, plan.file_read_timeout).await {
        Ok(lines) => lines,
        Err(e) => {
            log::error!("Skipping user {}: {}", user, e);
            outcome.access_error = Some(e.to_string());
            return outcome;
        }
    };

    for line in &lines {
        match ingest_line(store, plan, host_name, user, &path, line).await {
            EntryOutcome::Committed => outcome.committed += 1,
            EntryOutcome::Skipped => outcome.skipped += 1,
            EntryOutcome::Failed => outcome.failed += 1,
        }
    }

    log::info!(
        "✓ {} ({} committed, {} skipped, {} failed)",
        user,
        outcome.committed,
        outcome.skipped,
        outcome.failed
    );
    outcome
}

async fn ingest_line<S: RecordStore>(
    store: &S,
    plan: &ScanPlan,
    host_name: &str,
    user: &str,
    path: &Path,
    line: &TokenizedLine,
) -> EntryOutcome {
    let entry = match TaskEntry::build(host_name, user, &line.fields, plan.empty_command) {
        Ok(entry) => entry,
        Err(e) => {
            log::warn!("{}:{} skipped: {}", path.display(), line.line_number, e);
            return EntryOutcome::Skipped;
        }
    };
    log::trace!("{}", entry);

    match store.upsert(&entry).await {
        Ok(id) => {
            log::debug!("{}:{} stored as id {}", path.display(), line.line_number, id);
            EntryOutcome::Committed
        }
        Err(e) => {
            log::error!("✗ {}:{} rejected by store: {}", path.display(), line.line_number, e);
            log::error!("Rejected entry: {}", entry);
            EntryOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_entries, list_entries, EntryFilter, SqliteTaskStore};
    use crate::error::CronscanError;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Keeps every accepted entry in memory; rejects commands containing `FAIL`.
    #[derive(Default)]
    struct RecordingStore {
        accepted: Mutex<Vec<TaskEntry>>,
        attempts: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn commands(&self) -> Vec<String> {
            self.accepted.lock().unwrap().iter().map(|e| e.command.clone()).collect()
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl RecordStore for RecordingStore {
        async fn upsert(&self, entry: &TaskEntry) -> Result<i64> {
            self.attempts.lock().unwrap().push(entry.command.clone());
            if entry.command.contains("FAIL") {
                return Err(CronscanError::Database(rusqlite::Error::InvalidQuery));
            }
            let mut accepted = self.accepted.lock().unwrap();
            accepted.push(entry.clone());
            Ok(accepted.len() as i64)
        }
    }

    fn plan(spool: &Path, users: &[&str]) -> ScanPlan {
        ScanPlan {
            users: users.iter().map(|u| u.to_string()).collect(),
            spool_root: spool.to_path_buf(),
            include_commented: false,
            empty_command: EmptyCommandPolicy::Reject,
            host: HostIdentity::Fixed("web-01".to_string()),
            run_deadline: None,
            file_read_timeout: None,
        }
    }

    fn write_crontab(spool: &TempDir, user: &str, content: &str) {
        fs::write(spool.path().join(user), content).unwrap();
    }

    #[tokio::test]
    async fn test_single_entry_committed() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "root", "0 5 * * * /bin/backup.sh\n");
        let store = RecordingStore::default();

        let summary = run(&store, &plan(spool.path(), &["root"])).await.unwrap();

        assert_eq!(summary.host_name, "web-01");
        assert_eq!(summary.committed(), 1);
        let accepted = store.accepted.lock().unwrap();
        assert_eq!(accepted[0].command, "/bin/backup.sh");
        assert_eq!(accepted[0].user_name, "root");
        assert_eq!(accepted[0].host_name, "web-01");
    }

    #[tokio::test]
    async fn test_comment_policy_applied() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "root", "#0 5 * * * /bin/backup.sh\n");

        let store = RecordingStore::default();
        let summary = run(&store, &plan(spool.path(), &["root"])).await.unwrap();
        assert_eq!(summary.committed(), 0);
        assert_eq!(summary.skipped(), 0);

        let store = RecordingStore::default();
        let mut with_comments = plan(spool.path(), &["root"]);
        with_comments.include_commented = true;
        let summary = run(&store, &with_comments).await.unwrap();
        assert_eq!(summary.committed(), 1);
        assert_eq!(store.accepted.lock().unwrap()[0].minute, "#0");
    }

    #[tokio::test]
    async fn test_malformed_line_skipped_not_committed() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "root", "* * * *\n0 5 * * * /bin/after.sh\n");
        let store = RecordingStore::default();

        let summary = run(&store, &plan(spool.path(), &["root"])).await.unwrap();

        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.committed(), 1);
        assert_eq!(store.attempts(), vec!["/bin/after.sh"]);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_next_record() {
        let spool = TempDir::new().unwrap();
        write_crontab(
            &spool,
            "root",
            "1 * * * * /bin/one\n2 * * * * /bin/FAIL\n3 * * * * /bin/three\n",
        );
        let store = RecordingStore::default();

        let summary = run(&store, &plan(spool.path(), &["root"])).await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.committed(), 2);
        assert_eq!(store.attempts(), vec!["/bin/one", "/bin/FAIL", "/bin/three"]);
        assert_eq!(store.commands(), vec!["/bin/one", "/bin/three"]);
    }

    #[tokio::test]
    async fn test_unreadable_user_does_not_block_next_user() {
        let spool = TempDir::new().unwrap();
        // First user has no crontab at all
        write_crontab(&spool, "bob", "0 1 * * * /bin/a\n0 2 * * * /bin/b\n");
        let store = RecordingStore::default();

        let summary = run(&store, &plan(spool.path(), &["alice", "bob"])).await.unwrap();

        assert_eq!(summary.users.len(), 2);
        assert!(summary.users[0].access_error.is_some());
        assert_eq!(summary.users[0].committed, 0);
        assert_eq!(summary.users[1].committed, 2);
        assert_eq!(summary.unreadable_users(), 1);
        let accepted = store.accepted.lock().unwrap();
        assert!(accepted.iter().all(|e| e.user_name == "bob"));
    }

    #[tokio::test]
    async fn test_summary_serializes_to_json() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "bob", "0 1 * * * /bin/a\n* * *\n");
        let store = RecordingStore::default();

        let summary = run(&store, &plan(spool.path(), &["alice", "bob"])).await.unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["host_name"], "web-01");
        assert_eq!(json["deadline_reached"], false);
        assert_eq!(json["users"][0]["user"], "alice");
        assert!(json["users"][0]["access_error"].is_string());
        assert_eq!(json["users"][1]["committed"], 1);
        assert_eq!(json["users"][1]["skipped"], 1);
        assert!(json["users"][1]["access_error"].is_null());
    }

    #[tokio::test]
    async fn test_entries_submitted_in_file_order_per_user() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "alice", "1 * * * * /a/1\n\n2 * * * * /a/2\n");
        write_crontab(&spool, "bob", "1 * * * * /b/1\n");
        let store = RecordingStore::default();

        run(&store, &plan(spool.path(), &["alice", "bob"])).await.unwrap();

        assert_eq!(store.attempts(), vec!["/a/1", "/a/2", "/b/1"]);
    }

    #[tokio::test]
    async fn test_host_resolution_failure_is_fatal() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "root", "0 5 * * * /bin/backup.sh\n");
        let store = RecordingStore::default();
        let mut bad_host = plan(spool.path(), &["root"]);
        bad_host.host = HostIdentity::Fixed(" ".to_string());

        let err = run(&store, &bad_host).await.unwrap_err();
        assert!(matches!(err, CronscanError::HostResolution(_)));
        assert!(store.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_elapsed_deadline_stops_before_scanning() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "root", "0 5 * * * /bin/backup.sh\n");
        let store = RecordingStore::default();
        let mut expired = plan(spool.path(), &["root"]);
        expired.run_deadline = Some(Duration::ZERO);

        let summary = run(&store, &expired).await.unwrap();
        assert!(summary.deadline_reached);
        assert!(summary.users.is_empty());
        assert!(store.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_command_policy_paths() {
        let spool = TempDir::new().unwrap();
        write_crontab(&spool, "root", "0 5 * * * \n");

        let store = RecordingStore::default();
        let summary = run(&store, &plan(spool.path(), &["root"])).await.unwrap();
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.committed(), 0);

        let store = RecordingStore::default();
        let mut accepting = plan(spool.path(), &["root"]);
        accepting.empty_command = EmptyCommandPolicy::Accept;
        let summary = run(&store, &accepting).await.unwrap();
        assert_eq!(summary.committed(), 1);
        assert_eq!(store.commands(), vec![""]);
    }

    #[tokio::test]
    async fn test_end_to_end_with_sqlite_store() {
        let spool = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        write_crontab(
            &spool,
            "root",
            &format!(
                "MAILTO=ops@example.com\n0 5 * * * /bin/backup.sh --full\n0 6 * * * {}\n30 * * * * /bin/last.sh\n",
                "x".repeat(600)
            ),
        );
        let store = SqliteTaskStore::open(db_dir.path().join("cron.db")).await.unwrap();

        let summary = run(&store, &plan(spool.path(), &["nobody", "root"])).await.unwrap();

        assert_eq!(summary.unreadable_users(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.committed(), 2);
        assert_eq!(count_entries(store.db()).await.unwrap(), 2);

        let rows = list_entries(store.db(), &EntryFilter::default()).await.unwrap();
        assert_eq!(rows[0].command, "/bin/backup.sh --full");
        assert_eq!(rows[1].command, "/bin/last.sh");
        assert!(rows.iter().all(|r| r.host_name == "web-01" && r.user_name == "root"));

        assert!(store.shutdown(Duration::ZERO, Duration::ZERO).await.unwrap());
    }

    #[test]
    fn test_plan_from_config() {
        let config = Config::from_toml_str(
            r#"
[cronscan]
db_path = "cron.db"
spool_root = "/srv/spool"
host_name = "batch-7"

[scan]
users = ["root", "deploy"]
include_commented_entries = true
run_deadline_secs = 30
"#,
        )
        .unwrap();

        let plan = ScanPlan::from_config(&config);
        assert_eq!(plan.users, vec!["root", "deploy"]);
        assert!(plan.include_commented);
        assert_eq!(plan.host, HostIdentity::Fixed("batch-7".to_string()));
        assert_eq!(plan.run_deadline, Some(Duration::from_secs(30)));
        assert_eq!(plan.file_read_timeout, None);
        assert_eq!(plan.crontab_path("deploy"), PathBuf::from("/srv/spool/deploy"));
    }
}
