use action_scheduler::store::UacQidPair;
use action_scheduler::workflows::fulfilment::{IssuanceError, UacQidIssuer};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Local issuer for the demo. Pairs are sequential and never collide within a run.
#[derive(Default)]
pub(crate) struct SequentialUacQidIssuer {
    issued: AtomicU64,
}

impl SequentialUacQidIssuer {
    pub(crate) fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

impl UacQidIssuer for SequentialUacQidIssuer {
    fn issue(
        &self,
        case_id: &Uuid,
        questionnaire_type: &str,
    ) -> Result<UacQidPair, IssuanceError> {
        let serial = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let case_prefix: String = case_id.simple().to_string().chars().take(8).collect();
        Ok(UacQidPair {
            uac: format!("{case_prefix}{serial:08}"),
            qid: format!("{questionnaire_type}{serial:014}"),
        })
    }
}
