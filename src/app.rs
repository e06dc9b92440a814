use crate::recommend::{age_in_months, filter_catalog, recommendations_for, VaccineCatalog};
use crate::record::{emit_records, DoseSelection, SubmissionPayload, SubmitOutcome};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use egui::Color32;
use itertools::Itertools;
use jiff::{civil::date as jiffdate, civil::Date, Zoned};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

const DATE_FMT: &str = "%Y-%m-%d";

// One in-progress registration session for a patient or dependent. The
// recommendation list is recomputed whenever the birthdate (and so the age)
// changes; dose selections start empty at that point.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PatientForm {
    birthdate: Date,
    computed_age: Option<u32>,
    selections: Vec<DoseSelection>,
}

impl Default for PatientForm {
    fn default() -> Self {
        Self {
            birthdate: Zoned::now().date(),
            computed_age: None,
            selections: vec![],
        }
    }
}

impl PatientForm {
    fn invalidate(&mut self) {
        self.computed_age = None;
        self.selections.clear();
    }

    fn applied_total(&self) -> usize {
        self.selections.iter().map(|s| s.applied_count()).sum()
    }
}

#[derive(Clone, Debug)]
enum Notice {
    Info(String),
    Error(String),
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct VaccinationRegistryApp {
    active_patient: String,
    patients: HashMap<String, PatientForm>,
    catalog: VaccineCatalog,

    // Window state
    show_patients: bool,
    show_about: bool,

    // Add patient widget
    add_patient_name: String,

    #[serde(skip)]
    notice: Option<Notice>,
    #[serde(skip, default = "catalog_channel")]
    catalog_channel: (Sender<String>, Receiver<String>),
}

// The import picker callback sends through this. Keeping the sender on the
// app means a cancelled picker leaves no dangling channel state behind; a
// picker that never fires simply never sends.
fn catalog_channel() -> (Sender<String>, Receiver<String>) {
    mpsc::channel()
}

impl Default for VaccinationRegistryApp {
    fn default() -> Self {
        Self {
            active_patient: "Default".to_owned(),
            patients: HashMap::from_iter([("Default".to_owned(), PatientForm::default())]),
            catalog: VaccineCatalog::default(),
            show_patients: false,
            show_about: false,
            add_patient_name: "".to_owned(),
            notice: None,
            catalog_channel: catalog_channel(),
        }
    }
}

impl VaccinationRegistryApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        // Load previous app state (if any).
        // Note that you must enable the `persistence` feature for this to work.
        if let Some(storage) = cc.storage {
            return eframe::get_value(storage, eframe::APP_KEY).unwrap_or_default();
        }

        Default::default()
    }

    fn poll_catalog_import(&mut self) {
        let Ok(data) = self.catalog_channel.1.try_recv() else {
            return;
        };
        match VaccineCatalog::from_ron(&data) {
            Ok(catalog) => {
                info!("imported catalog with {} vaccines", catalog.len());
                self.notice = Some(Notice::Info(format!(
                    "Imported catalog with {} vaccines.",
                    catalog.len()
                )));
                self.catalog = catalog;
                // Recommendations are a function of the catalog too.
                for form in self.patients.values_mut() {
                    form.invalidate();
                }
            }
            Err(err) => {
                self.notice = Some(Notice::Error(format!("Catalog import failed: {err:#}")));
            }
        }
    }

    fn start_catalog_import(&mut self) {
        let tx = self.catalog_channel.0.clone();
        if let Err(err) = crate::pick_catalog_file(move |data| {
            let _ = tx.send(data);
        }) {
            self.notice = Some(Notice::Error(format!("Catalog import failed: {err:#}")));
        }
    }

    // Emission consumes the session state; a cancelled or failed submission
    // puts the backup copy back so the user can retry without re-entering
    // anything. Only an actual write counts as a completed session.
    fn save_active_form<F>(&mut self, today: Date, submit: F)
    where
        F: FnOnce(&str, &str) -> Result<SubmitOutcome>,
    {
        let form = self
            .patients
            .entry(self.active_patient.clone())
            .or_default();
        if form.applied_total() == 0 {
            return;
        }
        let backup = form.selections.clone();
        let entries = emit_records(std::mem::take(&mut form.selections));
        let payload = SubmissionPayload {
            patient: self.active_patient.clone(),
            submitted_on: today.to_string(),
            entries,
        };
        let submitted = ron::ser::to_string_pretty(&payload, ron::ser::PrettyConfig::default())
            .map_err(anyhow::Error::from)
            .and_then(|data| submit(&data, "vaccination_records.ron"));
        match submitted {
            Ok(SubmitOutcome::Saved) => {
                info!(
                    "saved {} records for {}",
                    payload.entries.len(),
                    payload.patient
                );
                self.notice = Some(Notice::Info(format!(
                    "Saved {} records for {}.",
                    payload.entries.len(),
                    payload.patient
                )));
                // Fresh session for the same age next frame.
                form.invalidate();
            }
            Ok(SubmitOutcome::Cancelled) => {
                form.selections = backup;
            }
            Err(err) => {
                form.selections = backup;
                self.notice = Some(Notice::Error(format!("Save failed: {err:#}")));
            }
        }
    }
}

impl eframe::App for VaccinationRegistryApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_catalog_import();

        // Menu Bar
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Patients...").clicked() {
                        self.show_patients = true;
                        ui.close_menu();
                    }
                    if ui.button("Import Catalog...").clicked() {
                        self.start_catalog_import();
                        ui.close_menu();
                    }

                    // NOTE: no File->Quit on web pages!
                    let is_web = cfg!(target_arch = "wasm32");
                    if !is_web {
                        ui.separator();
                        if ui.button("Quit").clicked() {
                            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        }
                    }
                });
                ui.menu_button("Help", |ui| {
                    if ui.button("About...").clicked() {
                        self.show_about = true;
                        ui.close_menu();
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("Vaccination Registration");
                ui.label(format!("Registering for: {}", self.active_patient));
                if let Some(notice) = &self.notice {
                    match notice {
                        Notice::Info(msg) => ui.colored_label(Color32::DARK_GREEN, msg),
                        Notice::Error(msg) => ui.colored_label(Color32::RED, msg),
                    };
                }
                ui.separator();

                let form = self
                    .patients
                    .entry(self.active_patient.clone())
                    .or_default();

                // Birthdate entry. The picker speaks chrono; everything else
                // speaks jiff.
                ui.horizontal(|ui| {
                    ui.label("Birthdate:");
                    let mut picked = NaiveDate::from_ymd_opt(
                        form.birthdate.year().into(),
                        form.birthdate.month() as u32,
                        form.birthdate.day() as u32,
                    )
                    .expect("a valid date");
                    let resp = ui.add(
                        egui_extras::DatePickerButton::new(&mut picked)
                            .id_salt("birthdate_picker")
                            .show_icon(true),
                    );
                    if resp.changed() {
                        form.birthdate =
                            jiffdate(picked.year() as i16, picked.month() as i8, picked.day() as i8);
                    }
                });

                let today = Zoned::now().date();
                match age_in_months(form.birthdate, today) {
                    Ok(age) => {
                        if form.computed_age != Some(age) {
                            let set = recommendations_for(age, &self.catalog);
                            form.selections = filter_catalog(&set, &self.catalog)
                                .iter()
                                .map(DoseSelection::new)
                                .collect();
                            form.computed_age = Some(age);
                        }
                        ui.label(format!("Age: {age} months"));
                    }
                    Err(err) => {
                        form.invalidate();
                        ui.colored_label(Color32::RED, format!("{err:#}"));
                    }
                }
                ui.label("");

                ui.heading("Recommended Vaccines");
                ui.label("Check each dose already administered and pick its date if known.");
                let today_naive = NaiveDate::from_ymd_opt(
                    today.year().into(),
                    today.month() as u32,
                    today.day() as u32,
                )
                .expect("a valid date");
                for selection in form.selections.iter_mut() {
                    let mut title = egui::RichText::new(format!(
                        "{} (requires {} of {} doses)",
                        selection.commercial_name(),
                        selection.required_doses(),
                        selection.max_doses(),
                    ));
                    if selection.is_complete() {
                        title = title.color(Color32::DARK_GREEN).strong();
                    }
                    ui.label(title);
                    ui.horizontal(|ui| {
                        for dose in 1..=selection.max_doses() {
                            let mut applied = selection.is_applied(dose);
                            if ui.checkbox(&mut applied, format!("#{dose}")).changed() {
                                selection.toggle_dose(dose);
                            }
                            if selection.is_applied(dose) {
                                let mut picked = selection
                                    .date_for(dose)
                                    .and_then(|d| NaiveDate::parse_from_str(d, DATE_FMT).ok())
                                    .unwrap_or(today_naive);
                                let salt = format!("{}_{dose}", selection.vaccine_id());
                                let resp = ui.add(
                                    egui_extras::DatePickerButton::new(&mut picked)
                                        .id_salt(&salt)
                                        .show_icon(false),
                                );
                                if resp.changed() {
                                    selection
                                        .set_dose_date(dose, &picked.format(DATE_FMT).to_string());
                                }
                            }
                        }
                    });
                }
                ui.label("");

                // Review what will be saved before committing to it.
                let applied_total = form.applied_total();
                if applied_total > 0 {
                    ui.heading("Doses to Save");
                    egui::Grid::new("review_grid").num_columns(3).show(ui, |ui| {
                        for selection in &form.selections {
                            for dose in 1..=selection.max_doses() {
                                if !selection.is_applied(dose) {
                                    continue;
                                }
                                ui.label(selection.commercial_name());
                                ui.label(format!("Dose #{dose}"));
                                ui.label(selection.date_for(dose).unwrap_or("no date"));
                                ui.end_row();
                            }
                        }
                    });
                }

                ui.separator();
                let save = ui.add_enabled(
                    applied_total > 0,
                    egui::Button::new(format!("Save {applied_total} Records")),
                );
                if save.clicked() {
                    self.save_active_form(today, crate::submit_payload);
                }

                // Show sub-windows
                self.show_patient_list(ctx);
                self.show_about(ctx);

                ui.with_layout(egui::Layout::bottom_up(egui::Align::RIGHT), |ui| {
                    powered_by_egui_and_eframe(ui);
                    egui::warn_if_debug_build(ui);
                });
            });
        });
    }

    /// Called by the frame work to save state before shutdown.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, self);
    }
}

impl VaccinationRegistryApp {
    fn show_patient_list(&mut self, ctx: &egui::Context) {
        egui::Window::new("Patients")
            .open(&mut self.show_patients)
            .show(ctx, |ui| {
                ui.heading("Patients & Dependents");
                ui.label("Each patient or dependent keeps their own in-progress form. Deletion is immediate, irreversible, and has no confirmation prompt.");
                ui.separator();
                let patient_names = self.patients.keys().cloned().sorted().collect_vec();
                for name in patient_names {
                    let is_active_row = name == self.active_patient;
                    ui.horizontal(|ui| {
                        ui.add_enabled_ui(!is_active_row, |ui| {
                            if ui.button("Activate").clicked() {
                                self.active_patient = name.clone();
                            }
                        });
                        ui.add_enabled_ui(!is_active_row, |ui| {
                            if ui.button("Delete").clicked() {
                                self.patients.remove(&name);
                            }
                        });
                        let mut content = egui::RichText::new(name);
                        if is_active_row {
                            content = content.strong();
                        }
                        ui.label(content);
                    });
                }
                ui.separator();
                ui.horizontal(|ui| {
                    ui.label("Add a patient or dependent:");
                    ui.text_edit_singleline(&mut self.add_patient_name);
                    if ui.button("Add").clicked() && !self.add_patient_name.is_empty() {
                        self.patients
                            .insert(self.add_patient_name.clone(), PatientForm::default());
                        self.active_patient = self.add_patient_name.clone();
                        self.add_patient_name = "".to_owned();
                    }
                });
            });
    }

    fn show_about(&mut self, ctx: &egui::Context) {
        egui::Window::new("About")
            .open(&mut self.show_about)
            .show(ctx, |ui| {
                ui.heading("Warning");
                ui.separator();
                ui.label("Usage of this (extremely simple) tool does not constitute medical advice. The schedule shown here is a starting point; please confirm with a doctor or vaccination center which schedule applies to you.");
                ui.label("");

                ui.heading("About this Tool");
                ui.separator();
                ui.label("Vaccination Registry helps families capture which doses of the recommended childhood schedule each patient or dependent has already received, and export those records for their vaccination center.");
                ui.label("");
                ui.label("Records are saved as RON files. A custom vaccine catalog can be imported from a RON file via File > Import Catalog.");
            });
    }
}

fn powered_by_egui_and_eframe(ui: &mut egui::Ui) {
    // Note: right alignment, so add in opposite order.
    ui.horizontal(|ui| {
        ui.label(".");
        ui.hyperlink_to(
            "eframe",
            "https://github.com/emilk/egui/tree/master/crates/eframe",
        );
        ui.label(" and ");
        ui.hyperlink_to("egui", "https://github.com/emilk/egui");
        ui.label("Powered by ");
    });
}
