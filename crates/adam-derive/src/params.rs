//! Study-specific derivation parameters.

use serde::{Deserialize, Serialize};

/// A visit that sets a completion flag in ADSL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneVisit {
    /// Visit label as recorded in SV (e.g. "WEEK 8").
    pub visit: String,
    /// ADSL flag set when the visit was attended.
    pub flag: String,
}

/// Time-to-event endpoint built from an ADAE event category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToEventEndpoint {
    pub paramcd: String,
    pub param: String,
    /// ADAE `CQ01NAM` value whose first occurrence is the event.
    pub category: String,
    pub event_description: String,
    pub censor_description: String,
}

/// Constants that differ between studies.
///
/// Every field has a default matching the CDISC pilot study, so an empty
/// `[params]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationParams {
    /// ARM value of subjects who failed screening.
    pub screen_failure_arm: String,
    /// Questionnaire test codes required for the efficacy population.
    pub efficacy_tests: Vec<String>,
    /// Efficacy tests must be recorded after this visit number.
    pub efficacy_min_visit: f64,
    pub milestone_visits: Vec<MilestoneVisit>,
    /// Visit number whose SV start date becomes VISIT1DT.
    pub first_visit: f64,
    /// Visit number of the baseline height measurement.
    pub height_visit: f64,
    /// Visit number of the baseline weight measurement.
    pub weight_visit: f64,
    /// Visit number that counts as the end-of-study visit.
    pub end_of_study_visit: f64,
    /// Disposition visit numbers at or above this map to the end-of-study visit.
    pub end_of_study_cap_from: f64,
    /// Minimum subjects per arm for a site to stand alone.
    pub site_pool_threshold: usize,
    pub pooled_site: String,
    /// MH category of the primary diagnosis.
    pub diagnosis_category: String,
    /// QS category summed into MMSETOT.
    pub cognitive_category: String,
    pub education_test: String,
    /// LBCAT kept in ADLBC.
    pub lab_category: String,
    /// Last scheduled week.
    pub final_week: f64,
    /// ANL01FL considers visits strictly after this week.
    pub window_lower_week: f64,
    pub low_limit_factor: f64,
    pub high_limit_factor: f64,
    /// Event category assigned by keyword match.
    pub event_category: String,
    /// Terms matched against AEDECOD and AETERM.
    pub category_keywords: Vec<String>,
    /// Body system whose events join the category unless excluded.
    pub category_body_system: String,
    pub category_exclusions: Vec<String>,
    pub endpoints: Vec<TimeToEventEndpoint>,
    /// Reject subjects with neither event nor censoring date instead of
    /// emitting a record with missing duration.
    pub strict_censoring: bool,
}

impl Default for DerivationParams {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            screen_failure_arm: "Screen Failure".to_string(),
            efficacy_tests: strings(&["ACTOT", "CIBIC"]),
            efficacy_min_visit: 3.0,
            milestone_visits: [("WEEK 8", "COMP8FL"), ("WEEK 16", "COMP16FL"), ("WEEK 24", "COMP24FL")]
                .into_iter()
                .map(|(visit, flag)| MilestoneVisit {
                    visit: visit.to_string(),
                    flag: flag.to_string(),
                })
                .collect(),
            first_visit: 1.0,
            height_visit: 1.0,
            weight_visit: 3.0,
            end_of_study_visit: 12.0,
            end_of_study_cap_from: 13.0,
            site_pool_threshold: 3,
            pooled_site: "900".to_string(),
            diagnosis_category: "PRIMARY DIAGNOSIS".to_string(),
            cognitive_category: "MINI-MENTAL STATE".to_string(),
            education_test: "EDLEVEL".to_string(),
            lab_category: "CHEMISTRY".to_string(),
            final_week: 26.0,
            window_lower_week: 2.0,
            low_limit_factor: 0.5,
            high_limit_factor: 1.5,
            event_category: "DERMATOLOGIC EVENTS".to_string(),
            category_keywords: strings(&["APPLICATION", "DERMATITIS", "ERYTHEMA", "BLISTER"]),
            category_body_system: "SKIN AND SUBCUTANEOUS TISSUE DISORDERS".to_string(),
            category_exclusions: strings(&["COLD SWEAT", "HYPERHIDROSIS", "ALOPECIA"]),
            endpoints: vec![TimeToEventEndpoint {
                paramcd: "TTDE".to_string(),
                param: "Time to First Dermatologic Event".to_string(),
                category: "DERMATOLOGIC EVENTS".to_string(),
                event_description: "Dermatologic Event Occurred".to_string(),
                censor_description: "Study Completion Date".to_string(),
            }],
            strict_censoring: false,
        }
    }
}
