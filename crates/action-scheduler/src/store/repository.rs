use uuid::Uuid;

use super::domain::{ActionRule, Case, JobId, PrintJob, QueuedPrintJob, UacQidLink};

/// Durable keyed store for cases, UAC/QID links, and queued print jobs.
///
/// All writes go through [`ActionStore::transaction`]: the closure's writes become
/// visible together when it returns `Ok`, and none of them do when it returns `Err`.
pub trait ActionStore: Send + Sync {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>;

    fn find_case(&self, case_id: &Uuid) -> Result<Option<Case>, StoreError> {
        self.transaction(|tx| tx.case_by_id(case_id))
    }

    fn find_case_by_ref(&self, case_ref: i64) -> Result<Option<Case>, StoreError> {
        self.transaction(|tx| tx.case_by_ref(case_ref))
    }
}

/// Operations available inside one store transaction.
pub trait StoreTransaction {
    /// Inserts the case, or replaces it in place when the case id already exists.
    fn save_case(&mut self, case: Case) -> Result<(), StoreError>;
    fn case_by_id(&self, case_id: &Uuid) -> Result<Option<Case>, StoreError>;
    fn case_by_ref(&self, case_ref: i64) -> Result<Option<Case>, StoreError>;

    /// Appends a link. UAC and QID values must not already be in use.
    fn insert_uac_qid_link(&mut self, link: UacQidLink) -> Result<(), StoreError>;
    /// Links of one case in the order they were stored.
    fn uac_qid_links_for_case(&self, case_id: &Uuid) -> Result<Vec<UacQidLink>, StoreError>;
    fn case_id_for_qid(&self, qid: &str) -> Result<Option<Uuid>, StoreError>;

    /// Sets the receipt flag. Returns `false` when it was already set.
    fn mark_receipted(&mut self, case_id: &Uuid) -> Result<bool, StoreError>;
    /// Cases of the plan without a receipt, ordered by case ref.
    fn unreceipted_cases_for_plan(&self, action_plan_id: &str) -> Result<Vec<Case>, StoreError>;

    /// Inserts the rule, or replaces it while it has not triggered.
    fn save_action_rule(&mut self, rule: ActionRule) -> Result<(), StoreError>;
    fn action_rules(&self) -> Result<Vec<ActionRule>, StoreError>;
    /// Flags a rule as triggered. Fails when it already is.
    fn mark_rule_triggered(&mut self, id: Uuid) -> Result<(), StoreError>;

    fn enqueue_print_job(&mut self, job: PrintJob) -> Result<QueuedPrintJob, StoreError>;
    fn queued_print_jobs(&self) -> Result<Vec<QueuedPrintJob>, StoreError>;
    fn unbatched_print_jobs(&self) -> Result<Vec<QueuedPrintJob>, StoreError>;
    fn batched_print_jobs(&self) -> Result<Vec<QueuedPrintJob>, StoreError>;

    /// Attaches a batch to a job whose batch id is still unset.
    fn assign_batch(&mut self, id: JobId, batch_id: Uuid, quantity: u32)
        -> Result<(), StoreError>;
    fn remove_print_job(&mut self, id: JobId) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("case ref {case_ref} already belongs to case {existing}")]
    DuplicateCaseRef { case_ref: i64, existing: Uuid },
    #[error("{field} '{value}' is already linked")]
    DuplicateUacQid { field: &'static str, value: String },
    #[error("print job {0} already has a batch")]
    AlreadyBatched(JobId),
    #[error("print job {0} not found")]
    JobNotFound(JobId),
    #[error("case {0} not found")]
    CaseNotFound(Uuid),
    #[error("action rule {0} not found")]
    RuleNotFound(Uuid),
    #[error("action rule {0} has already triggered")]
    RuleAlreadyTriggered(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
