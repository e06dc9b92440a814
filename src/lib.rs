#![warn(clippy::all, rust_2018_idioms)]

mod app;
mod recommend;
mod record;

#[cfg(target_arch = "wasm32")]
mod ser_web;
#[cfg(target_arch = "wasm32")]
pub use ser_web::{pick_catalog_file, submit_payload};

#[cfg(not(target_arch = "wasm32"))]
mod ser_native;
#[cfg(not(target_arch = "wasm32"))]
pub use ser_native::{pick_catalog_file, submit_payload};

pub use app::VaccinationRegistryApp;
pub use recommend::{
    age_in_months, filter_catalog, recommendations_for, RecommendationSet, RecommendedVaccine,
    VaccineCatalog, VaccineCatalogEntry, FULL_SCHEDULE_MONTHS,
};
pub use record::{emit_records, DoseSelection, SubmissionPayload, SubmitOutcome, VaccinationEntry};
