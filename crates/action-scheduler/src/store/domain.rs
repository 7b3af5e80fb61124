use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wire::null_as_default;

/// Lifecycle state carried on a case-created event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseState {
    Actionable,
}

impl CaseState {
    pub fn label(&self) -> &'static str {
        match self {
            CaseState::Actionable => "ACTIONABLE",
        }
    }
}

impl FromStr for CaseState {
    type Err = UnknownCaseState;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACTIONABLE" => Ok(CaseState::Actionable),
            other => Err(UnknownCaseState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown case state '{0}'")]
pub struct UnknownCaseState(pub String);

/// Postal address and location attributes of a case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub town_name: String,
    pub postcode: String,
    pub arid: String,
    pub latitude: String,
    pub longitude: String,
    pub uprn: String,
    pub region: String,
}

/// Census case as held by the store. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: Uuid,
    pub case_ref: i64,
    pub state: CaseState,
    pub address: Address,
    pub action_plan_id: String,
    pub treatment_code: String,
    pub oa: String,
    pub lsoa: String,
    pub msoa: String,
    pub lad: String,
    pub htc_willingness: String,
    pub htc_digital: String,
    pub receipt_received: bool,
}

/// Pairing of a unique access code with a questionnaire id for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UacQidLink {
    pub id: Uuid,
    pub uac: String,
    pub qid: String,
    pub case_id: Uuid,
}

/// A freshly issued UAC/QID value pair, before it is linked to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UacQidPair {
    pub uac: String,
    pub qid: String,
}

impl UacQidPair {
    pub fn link_to(&self, case_id: Uuid) -> UacQidLink {
        UacQidLink {
            id: Uuid::new_v4(),
            uac: self.uac.clone(),
            qid: self.qid.clone(),
            case_id,
        }
    }
}

/// Print template grouping shared by several fulfilment codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "P_OR_HX")]
    HouseholdQuestionnaire,
    #[serde(rename = "P_LP_HLX")]
    LargePrintHousehold,
    #[serde(rename = "P_TB_TBX")]
    TranslationBooklet,
    #[serde(rename = "P_OR_IX")]
    IndividualQuestionnaire,
}

impl ActionType {
    pub fn name(&self) -> &'static str {
        match self {
            ActionType::HouseholdQuestionnaire => "P_OR_HX",
            ActionType::LargePrintHousehold => "P_LP_HLX",
            ActionType::TranslationBooklet => "P_TB_TBX",
            ActionType::IndividualQuestionnaire => "P_OR_IX",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Initial-contact print run an action rule produces for every selected case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitialContactType {
    #[serde(rename = "ICHHQE")]
    HouseholdQuestionnaireEngland,
    #[serde(rename = "ICHHQW")]
    HouseholdQuestionnaireWales,
    #[serde(rename = "ICHHQN")]
    HouseholdQuestionnaireNorthernIreland,
    #[serde(rename = "ICL1E")]
    LetterEngland,
    #[serde(rename = "ICL2W")]
    LetterWales,
    #[serde(rename = "ICL4N")]
    LetterNorthernIreland,
}

impl InitialContactType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HouseholdQuestionnaireEngland => "ICHHQE",
            Self::HouseholdQuestionnaireWales => "ICHHQW",
            Self::HouseholdQuestionnaireNorthernIreland => "ICHHQN",
            Self::LetterEngland => "ICL1E",
            Self::LetterWales => "ICL2W",
            Self::LetterNorthernIreland => "ICL4N",
        }
    }

    pub fn pack_code(&self) -> &'static str {
        match self {
            Self::HouseholdQuestionnaireEngland => "P_IC_H1",
            Self::HouseholdQuestionnaireWales => "P_IC_H2",
            Self::HouseholdQuestionnaireNorthernIreland => "P_IC_H4",
            Self::LetterEngland => "P_IC_ICL1",
            Self::LetterWales => "P_IC_ICL2",
            Self::LetterNorthernIreland => "P_IC_ICL4",
        }
    }

    /// QID prefix of the link printed in the `iac`/`qid` fields.
    pub fn primary_questionnaire_type(&self) -> &'static str {
        match self {
            Self::HouseholdQuestionnaireEngland | Self::LetterEngland => "01",
            Self::HouseholdQuestionnaireWales | Self::LetterWales => "02",
            Self::HouseholdQuestionnaireNorthernIreland | Self::LetterNorthernIreland => "04",
        }
    }

    /// QID prefix of the Welsh-language link, for Welsh packs only.
    pub fn welsh_questionnaire_type(&self) -> Option<&'static str> {
        match self {
            Self::HouseholdQuestionnaireWales | Self::LetterWales => Some("03"),
            _ => None,
        }
    }
}

impl fmt::Display for InitialContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scheduled initial-contact run for the unreceipted cases of one action plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub action_plan_id: String,
    pub action_type: InitialContactType,
    #[serde(rename = "triggerDateTime")]
    pub trigger_at: DateTime<Utc>,
    #[serde(default)]
    pub has_triggered: bool,
    /// Restricts the run to these treatment codes when non-empty.
    #[serde(default)]
    pub treatment_codes: Vec<String>,
}

impl ActionRule {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.has_triggered && self.trigger_at <= now
    }

    pub fn selects(&self, case: &Case) -> bool {
        case.action_plan_id == self.action_plan_id
            && !case.receipt_received
            && (self.treatment_codes.is_empty()
                || self.treatment_codes.contains(&case.treatment_code))
    }
}

/// Named recipient of an individual fulfilment. Empty for household packs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub surname: String,
}

/// Sequence number assigned when a print job is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Denormalized content of a print job as produced by assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub fulfilment_code: String,
    pub case_id: Uuid,
    pub case_ref: i64,
    pub action_type: ActionType,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub town_name: String,
    pub postcode: String,
    pub contact: Contact,
    pub field_coordinator_id: Option<String>,
    pub field_officer_id: Option<String>,
    pub organisation_name: Option<String>,
    pub uac_qid: Option<UacQidPair>,
    pub uac_qid_wales: Option<UacQidPair>,
    pub quantity: u32,
    pub batch_id: Option<Uuid>,
}

impl PrintJob {
    /// Links for every pair issued while assembling this job.
    pub fn issued_links(&self) -> Vec<UacQidLink> {
        [self.uac_qid.as_ref(), self.uac_qid_wales.as_ref()]
            .into_iter()
            .flatten()
            .map(|pair| pair.link_to(self.case_id))
            .collect()
    }
}

/// Print job held in the store until it has been batched and dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPrintJob {
    pub id: JobId,
    pub queued_at: DateTime<Utc>,
    pub job: PrintJob,
}

impl QueuedPrintJob {
    pub fn is_batched(&self) -> bool {
        self.job.batch_id.is_some()
    }
}
