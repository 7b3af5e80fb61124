use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::domain::{ActionRule, Case, JobId, PrintJob, QueuedPrintJob, UacQidLink};
use super::repository::{ActionStore, StoreError, StoreTransaction};

/// Process-local store. Transactions are serialized by a single lock and write
/// in place, recording an undo entry per write so a failed transaction can be
/// reverted without copying the state.
#[derive(Debug, Default)]
pub struct InMemoryActionStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    cases: HashMap<Uuid, Case>,
    case_refs: HashMap<i64, Uuid>,
    links: HashMap<Uuid, Vec<UacQidLink>>,
    uacs: HashSet<String>,
    qids: HashMap<String, Uuid>,
    print_jobs: BTreeMap<JobId, QueuedPrintJob>,
    last_job_id: u64,
    action_rules: HashMap<Uuid, ActionRule>,
}

/// Inverse of one write, applied newest first on rollback.
#[derive(Debug)]
enum Undo {
    Case { case_id: Uuid, previous: Option<Case> },
    Link { case_id: Uuid },
    JobEnqueued { id: JobId, last_job_id: u64 },
    JobBatched { id: JobId, quantity: u32 },
    JobRemoved(QueuedPrintJob),
    Rule { id: Uuid, previous: Option<ActionRule> },
}

impl StoreState {
    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Case { case_id, previous } => {
                if let Some(current) = self.cases.remove(&case_id) {
                    self.case_refs.remove(&current.case_ref);
                }
                if let Some(previous) = previous {
                    self.case_refs.insert(previous.case_ref, case_id);
                    self.cases.insert(case_id, previous);
                }
            }
            Undo::Link { case_id } => {
                let Some(links) = self.links.get_mut(&case_id) else {
                    return;
                };
                if let Some(link) = links.pop() {
                    self.uacs.remove(&link.uac);
                    self.qids.remove(&link.qid);
                }
                if links.is_empty() {
                    self.links.remove(&case_id);
                }
            }
            Undo::JobEnqueued { id, last_job_id } => {
                self.print_jobs.remove(&id);
                self.last_job_id = last_job_id;
            }
            Undo::JobBatched { id, quantity } => {
                if let Some(queued) = self.print_jobs.get_mut(&id) {
                    queued.job.batch_id = None;
                    queued.job.quantity = quantity;
                }
            }
            Undo::JobRemoved(queued) => {
                self.print_jobs.insert(queued.id, queued);
            }
            Undo::Rule { id, previous } => match previous {
                Some(rule) => {
                    self.action_rules.insert(id, rule);
                }
                None => {
                    self.action_rules.remove(&id);
                }
            },
        }
    }

    fn case_by_ref(&self, case_ref: i64) -> Option<&Case> {
        self.case_refs
            .get(&case_ref)
            .and_then(|case_id| self.cases.get(case_id))
    }
}

/// Write access to the locked state for the duration of one transaction.
struct Transaction<'a> {
    state: &'a mut StoreState,
    undo: Vec<Undo>,
}

impl Transaction<'_> {
    fn rollback(self) {
        let Transaction { state, undo } = self;
        for entry in undo.into_iter().rev() {
            state.revert(entry);
        }
    }
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl ActionStore for InMemoryActionStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self.lock()?;
        let mut tx = Transaction {
            state: &mut *state,
            undo: Vec::new(),
        };

        match work(&mut tx) {
            Ok(value) => Ok(value),
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    fn find_case(&self, case_id: &Uuid) -> Result<Option<Case>, StoreError> {
        Ok(self.lock()?.cases.get(case_id).cloned())
    }

    fn find_case_by_ref(&self, case_ref: i64) -> Result<Option<Case>, StoreError> {
        Ok(self.lock()?.case_by_ref(case_ref).cloned())
    }
}

impl StoreTransaction for Transaction<'_> {
    fn save_case(&mut self, case: Case) -> Result<(), StoreError> {
        let state = &mut *self.state;
        if let Some(existing) = state.case_refs.get(&case.case_ref) {
            if *existing != case.case_id {
                return Err(StoreError::DuplicateCaseRef {
                    case_ref: case.case_ref,
                    existing: *existing,
                });
            }
        }

        let mut case = case;
        let previous = state.cases.remove(&case.case_id);
        if let Some(previous) = &previous {
            state.case_refs.remove(&previous.case_ref);
            case.receipt_received |= previous.receipt_received;
        }

        let case_id = case.case_id;
        state.case_refs.insert(case.case_ref, case_id);
        state.cases.insert(case_id, case);
        self.undo.push(Undo::Case { case_id, previous });
        Ok(())
    }

    fn case_by_id(&self, case_id: &Uuid) -> Result<Option<Case>, StoreError> {
        Ok(self.state.cases.get(case_id).cloned())
    }

    fn case_by_ref(&self, case_ref: i64) -> Result<Option<Case>, StoreError> {
        Ok(self.state.case_by_ref(case_ref).cloned())
    }

    fn insert_uac_qid_link(&mut self, link: UacQidLink) -> Result<(), StoreError> {
        let state = &mut *self.state;
        if state.uacs.contains(&link.uac) {
            return Err(StoreError::DuplicateUacQid {
                field: "uac",
                value: link.uac,
            });
        }
        if state.qids.contains_key(&link.qid) {
            return Err(StoreError::DuplicateUacQid {
                field: "qid",
                value: link.qid,
            });
        }

        let case_id = link.case_id;
        state.uacs.insert(link.uac.clone());
        state.qids.insert(link.qid.clone(), case_id);
        state.links.entry(case_id).or_default().push(link);
        self.undo.push(Undo::Link { case_id });
        Ok(())
    }

    fn uac_qid_links_for_case(&self, case_id: &Uuid) -> Result<Vec<UacQidLink>, StoreError> {
        Ok(self.state.links.get(case_id).cloned().unwrap_or_default())
    }

    fn case_id_for_qid(&self, qid: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.state.qids.get(qid).copied())
    }

    fn mark_receipted(&mut self, case_id: &Uuid) -> Result<bool, StoreError> {
        let case = self
            .state
            .cases
            .get_mut(case_id)
            .ok_or(StoreError::CaseNotFound(*case_id))?;
        if case.receipt_received {
            return Ok(false);
        }

        let previous = case.clone();
        case.receipt_received = true;
        self.undo.push(Undo::Case {
            case_id: *case_id,
            previous: Some(previous),
        });
        Ok(true)
    }

    fn unreceipted_cases_for_plan(&self, action_plan_id: &str) -> Result<Vec<Case>, StoreError> {
        let mut cases: Vec<Case> = self
            .state
            .cases
            .values()
            .filter(|case| case.action_plan_id == action_plan_id && !case.receipt_received)
            .cloned()
            .collect();
        cases.sort_by_key(|case| case.case_ref);
        Ok(cases)
    }

    fn enqueue_print_job(&mut self, job: PrintJob) -> Result<QueuedPrintJob, StoreError> {
        let last_job_id = self.state.last_job_id;
        let queued = QueuedPrintJob {
            id: JobId(last_job_id + 1),
            queued_at: Utc::now(),
            job,
        };
        self.state.last_job_id = queued.id.0;
        self.state.print_jobs.insert(queued.id, queued.clone());
        self.undo.push(Undo::JobEnqueued {
            id: queued.id,
            last_job_id,
        });
        Ok(queued)
    }

    fn queued_print_jobs(&self) -> Result<Vec<QueuedPrintJob>, StoreError> {
        Ok(self.state.print_jobs.values().cloned().collect())
    }

    fn unbatched_print_jobs(&self) -> Result<Vec<QueuedPrintJob>, StoreError> {
        Ok(self
            .state
            .print_jobs
            .values()
            .filter(|queued| !queued.is_batched())
            .cloned()
            .collect())
    }

    fn batched_print_jobs(&self) -> Result<Vec<QueuedPrintJob>, StoreError> {
        Ok(self
            .state
            .print_jobs
            .values()
            .filter(|queued| queued.is_batched())
            .cloned()
            .collect())
    }

    fn assign_batch(
        &mut self,
        id: JobId,
        batch_id: Uuid,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let queued = self
            .state
            .print_jobs
            .get_mut(&id)
            .ok_or(StoreError::JobNotFound(id))?;
        if queued.is_batched() {
            return Err(StoreError::AlreadyBatched(id));
        }

        let previous_quantity = queued.job.quantity;
        queued.job.batch_id = Some(batch_id);
        queued.job.quantity = quantity;
        self.undo.push(Undo::JobBatched {
            id,
            quantity: previous_quantity,
        });
        Ok(())
    }

    fn remove_print_job(&mut self, id: JobId) -> Result<(), StoreError> {
        let removed = self
            .state
            .print_jobs
            .remove(&id)
            .ok_or(StoreError::JobNotFound(id))?;
        self.undo.push(Undo::JobRemoved(removed));
        Ok(())
    }

    fn save_action_rule(&mut self, rule: ActionRule) -> Result<(), StoreError> {
        let id = rule.id;
        if let Some(existing) = self.state.action_rules.get(&id) {
            if existing.has_triggered {
                return Err(StoreError::RuleAlreadyTriggered(id));
            }
        }

        let previous = self.state.action_rules.insert(id, rule);
        self.undo.push(Undo::Rule { id, previous });
        Ok(())
    }

    fn action_rules(&self) -> Result<Vec<ActionRule>, StoreError> {
        let mut rules: Vec<ActionRule> = self.state.action_rules.values().cloned().collect();
        rules.sort_by(|a, b| a.trigger_at.cmp(&b.trigger_at).then(a.id.cmp(&b.id)));
        Ok(rules)
    }

    fn mark_rule_triggered(&mut self, id: Uuid) -> Result<(), StoreError> {
        let rule = self
            .state
            .action_rules
            .get_mut(&id)
            .ok_or(StoreError::RuleNotFound(id))?;
        if rule.has_triggered {
            return Err(StoreError::RuleAlreadyTriggered(id));
        }

        let previous = rule.clone();
        rule.has_triggered = true;
        self.undo.push(Undo::Rule {
            id,
            previous: Some(previous),
        });
        Ok(())
    }
}
