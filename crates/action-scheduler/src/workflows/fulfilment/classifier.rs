//! Static fulfilment code tables.
//!
//! Several codes share one print template, so the category tables are
//! many-to-one. Only individual packs carry a questionnaire type, and the
//! presence of one means a new UAC/QID must be issued for the recipient.

use crate::store::ActionType;

pub const HOUSEHOLD_CODES: &[&str] = &[
    "P_OR_H1", "P_OR_H2", "P_OR_H2W", "P_OR_H4", "P_OR_HC1", "P_OR_HC2", "P_OR_HC2W", "P_OR_HC4",
];

pub const LARGE_PRINT_CODES: &[&str] = &["P_LP_HL1", "P_LP_HL2", "P_LP_HL2W", "P_LP_HL4"];

pub const TRANSLATION_BOOKLET_CODES: &[&str] = &[
    "P_TB_TBARA1",
    "P_TB_TBBEN1",
    "P_TB_TBCAN1",
    "P_TB_TBCAN4",
    "P_TB_TBFRE1",
    "P_TB_TBGUJ1",
    "P_TB_TBGUR1",
    "P_TB_TBIRI4",
    "P_TB_TBITA1",
    "P_TB_TBKUR1",
    "P_TB_TBLIT1",
    "T_PB_TBLIT4",
    "P_TB_TBMAN1",
    "P_TB_TBMAN4",
    "P_TB_TBPOL1",
    "P_TB_TBPOL4",
    "P_TB_TBPOR1",
    "P_TB_TBRUS1",
    "P_TB_TBURD1",
    "P_TB_TBSOM1",
    "P_TB_TBSPA1",
    "P_TB_TBTUR1",
    "P_TB_TBULS4",
    "P_TB_TBVIE1",
    "P_TB_TBYSH1",
];

pub const INDIVIDUAL_CODES: &[&str] = &["P_OR_I1", "P_OR_I2", "P_OR_I2W", "P_OR_I4"];

/// Fulfilled by the SMS service; never printed.
pub const SMS_CODES: &[&str] = &[
    "UACHHT1", "UACHHT2", "UACHHT2W", "UACHHT4", "UACIT1", "UACIT2", "UACIT2W", "UACIT4",
];

const CATEGORY_TABLE: &[(&[&str], ActionType)] = &[
    (HOUSEHOLD_CODES, ActionType::HouseholdQuestionnaire),
    (LARGE_PRINT_CODES, ActionType::LargePrintHousehold),
    (TRANSLATION_BOOKLET_CODES, ActionType::TranslationBooklet),
    (INDIVIDUAL_CODES, ActionType::IndividualQuestionnaire),
];

/// Questionnaire types to issue for a personalised product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionnaireType {
    pub primary: &'static str,
    /// Welsh-language form printed alongside the primary one.
    pub secondary_language: Option<&'static str>,
}

const QUESTIONNAIRE_TABLE: &[(&str, QuestionnaireType)] = &[
    (
        "P_OR_I1",
        QuestionnaireType {
            primary: "21",
            secondary_language: None,
        },
    ),
    (
        "P_OR_I2",
        QuestionnaireType {
            primary: "22",
            secondary_language: None,
        },
    ),
    (
        "P_OR_I2W",
        QuestionnaireType {
            primary: "22",
            secondary_language: Some("23"),
        },
    ),
    (
        "P_OR_I4",
        QuestionnaireType {
            primary: "24",
            secondary_language: None,
        },
    ),
];

/// Print category plus the questionnaire type, when the product needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionCategory {
    pub action_type: ActionType,
    pub questionnaire_type: Option<QuestionnaireType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Print(ActionCategory),
    /// Known code that produces nothing to print.
    NoAction,
    Unclassified,
}

pub fn classify(fulfilment_code: &str) -> Classification {
    if SMS_CODES.contains(&fulfilment_code) {
        return Classification::NoAction;
    }

    CATEGORY_TABLE
        .iter()
        .find(|(codes, _)| codes.contains(&fulfilment_code))
        .map(|(_, action_type)| {
            Classification::Print(ActionCategory {
                action_type: *action_type,
                questionnaire_type: questionnaire_type(fulfilment_code),
            })
        })
        .unwrap_or(Classification::Unclassified)
}

pub fn questionnaire_type(fulfilment_code: &str) -> Option<QuestionnaireType> {
    QUESTIONNAIRE_TABLE
        .iter()
        .find(|(code, _)| *code == fulfilment_code)
        .map(|(_, questionnaire)| *questionnaire)
}
