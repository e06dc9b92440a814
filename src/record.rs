use crate::recommend::RecommendedVaccine;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-vaccine dose bookkeeping for one in-progress form session.
///
/// Invariant: a dose number has a date in `dose_dates` if and only if it is
/// present in `applied_doses`, and dose numbers stay in `1..=max_doses`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DoseSelection {
    vaccine_id: u32,
    commercial_name: String,
    max_doses: u8,
    required_doses: u8,
    applied_doses: BTreeSet<u8>,
    dose_dates: BTreeMap<u8, String>,
}

impl DoseSelection {
    pub fn new(recommended: &RecommendedVaccine) -> Self {
        Self {
            vaccine_id: recommended.vaccine_id,
            commercial_name: recommended.commercial_name.clone(),
            max_doses: recommended.max_doses,
            required_doses: recommended.required_doses,
            applied_doses: BTreeSet::new(),
            dose_dates: BTreeMap::new(),
        }
    }

    pub fn vaccine_id(&self) -> u32 {
        self.vaccine_id
    }

    pub fn commercial_name(&self) -> &str {
        &self.commercial_name
    }

    pub fn max_doses(&self) -> u8 {
        self.max_doses
    }

    pub fn required_doses(&self) -> u8 {
        self.required_doses
    }

    pub fn is_applied(&self, dose: u8) -> bool {
        self.applied_doses.contains(&dose)
    }

    pub fn applied_count(&self) -> usize {
        self.applied_doses.len()
    }

    pub fn date_for(&self, dose: u8) -> Option<&str> {
        self.dose_dates.get(&dose).map(String::as_str)
    }

    // Flip whether `dose` has been administered. Removing a dose also drops
    // its date so the iff invariant holds. Self-inverse.
    pub fn toggle_dose(&mut self, dose: u8) {
        if !(1..=self.max_doses).contains(&dose) {
            warn!(
                "ignoring dose {dose} for {} (valid range 1..={})",
                self.commercial_name, self.max_doses
            );
            return;
        }
        if self.applied_doses.remove(&dose) {
            self.dose_dates.remove(&dose);
        } else {
            self.applied_doses.insert(dose);
        }
    }

    // A date may only be attached to a dose that is marked applied; anything
    // else is rejected as a no-op. Returns whether the date was stored.
    pub fn set_dose_date(&mut self, dose: u8, date: &str) -> bool {
        if !self.applied_doses.contains(&dose) {
            warn!(
                "refusing date for unapplied dose {dose} of {}",
                self.commercial_name
            );
            return false;
        }
        self.dose_dates.insert(dose, date.to_owned());
        true
    }

    // Display highlighting only; an incomplete card never blocks submission.
    pub fn is_complete(&self) -> bool {
        self.applied_doses.len() == usize::from(self.max_doses)
    }
}

/// One administered dose, ready for persistence. Produced at finalization
/// and never mutated afterward.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct VaccinationEntry {
    pub vaccine_id: u32,
    pub commercial_name: String,
    pub dose: u8,
    pub application_date: Option<String>,
}

// Flatten the session's selections into one entry per applied (vaccine,
// dose) pair. Takes the selections by value: a session's state is consumed
// exactly once and discarded.
pub fn emit_records(selections: Vec<DoseSelection>) -> Vec<VaccinationEntry> {
    let mut entries = Vec::new();
    for selection in selections {
        for dose in &selection.applied_doses {
            entries.push(VaccinationEntry {
                vaccine_id: selection.vaccine_id,
                commercial_name: selection.commercial_name.clone(),
                dose: *dose,
                application_date: selection.dose_dates.get(dose).cloned(),
            });
        }
    }
    entries
}

/// Whether the persistence boundary actually accepted the payload. A
/// cancelled save dialog is not a failure, but nothing was written either,
/// so the caller must not treat it as a completed submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Saved,
    Cancelled,
}

/// What actually crosses the persistence boundary: the emitted entries plus
/// the patient they belong to.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SubmissionPayload {
    pub patient: String,
    pub submitted_on: String,
    pub entries: Vec<VaccinationEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::RecommendedVaccine;

    fn pentavalente() -> DoseSelection {
        DoseSelection::new(&RecommendedVaccine {
            vaccine_id: 3,
            commercial_name: "Pentavalente".to_owned(),
            max_doses: 4,
            required_doses: 2,
        })
    }

    fn bcg() -> DoseSelection {
        DoseSelection::new(&RecommendedVaccine {
            vaccine_id: 1,
            commercial_name: "BCG".to_owned(),
            max_doses: 1,
            required_doses: 1,
        })
    }

    #[test]
    fn test_toggle_dose_is_self_inverse() {
        let mut selection = pentavalente();
        let pristine = selection.clone();

        selection.toggle_dose(2);
        assert!(selection.is_applied(2));
        selection.toggle_dose(2);
        assert_eq!(pristine, selection);

        // Still self-inverse once a date is attached.
        selection.toggle_dose(2);
        assert!(selection.set_dose_date(2, "2025-03-01"));
        selection.toggle_dose(2);
        assert_eq!(pristine, selection);
    }

    #[test]
    fn test_removing_dose_removes_its_date() {
        let mut selection = pentavalente();
        selection.toggle_dose(1);
        selection.toggle_dose(2);
        assert!(selection.set_dose_date(1, "2025-01-15"));
        assert!(selection.set_dose_date(2, "2025-03-15"));

        selection.toggle_dose(1);
        assert_eq!(None, selection.date_for(1));
        assert_eq!(Some("2025-03-15"), selection.date_for(2));
    }

    #[test]
    fn test_date_rejected_for_unapplied_dose() {
        let mut selection = pentavalente();
        assert!(!selection.set_dose_date(1, "2025-01-15"));
        assert_eq!(None, selection.date_for(1));
        assert_eq!(0, selection.applied_count());
    }

    #[test]
    fn test_out_of_range_doses_ignored() {
        let mut selection = bcg();
        selection.toggle_dose(0);
        selection.toggle_dose(2);
        assert_eq!(0, selection.applied_count());
        selection.toggle_dose(1);
        assert_eq!(1, selection.applied_count());
    }

    #[test]
    fn test_is_complete_tracks_max_doses() {
        let mut selection = pentavalente();
        for dose in 1..=3 {
            selection.toggle_dose(dose);
            assert!(!selection.is_complete());
        }
        selection.toggle_dose(4);
        assert!(selection.is_complete());
    }

    #[test]
    fn test_emitter_flattens_applied_doses() {
        let mut penta = pentavalente();
        penta.toggle_dose(1);
        penta.toggle_dose(2);
        assert!(penta.set_dose_date(1, "2025-01-15"));
        let mut first = bcg();
        first.toggle_dose(1);
        let untouched = DoseSelection::new(&RecommendedVaccine {
            vaccine_id: 4,
            commercial_name: "Rotavirus".to_owned(),
            max_doses: 3,
            required_doses: 1,
        });

        let entries = emit_records(vec![penta, first, untouched]);
        assert_eq!(3, entries.len());
        assert_eq!(
            VaccinationEntry {
                vaccine_id: 3,
                commercial_name: "Pentavalente".to_owned(),
                dose: 1,
                application_date: Some("2025-01-15".to_owned()),
            },
            entries[0]
        );
        // A checked dose without a date is tolerated, not fatal.
        assert_eq!(2, entries[1].dose);
        assert_eq!(None, entries[1].application_date);
        assert_eq!("BCG", entries[2].commercial_name);
    }

    #[test]
    fn test_emitter_empty_state_emits_nothing() {
        assert!(emit_records(vec![pentavalente(), bcg()]).is_empty());
    }

    #[test]
    fn test_payload_round_trips_through_ron() {
        let payload = SubmissionPayload {
            patient: "Ana".to_owned(),
            submitted_on: "2025-06-01".to_owned(),
            entries: vec![VaccinationEntry {
                vaccine_id: 1,
                commercial_name: "BCG".to_owned(),
                dose: 1,
                application_date: None,
            }],
        };
        let data = ron::to_string(&payload).unwrap();
        assert_eq!(payload, ron::from_str(&data).unwrap());
    }
}
