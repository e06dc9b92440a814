use crate::record::SubmitOutcome;
use anyhow::Result;
use std::fs;

pub fn submit_payload(data: &str, filename: &str) -> Result<SubmitOutcome> {
    let target = rfd::FileDialog::default()
        .set_title("Save Vaccination Records")
        .set_file_name(filename)
        .add_filter("RON Files", &["ron", "RON"])
        .save_file();
    let Some(path) = target else {
        return Ok(SubmitOutcome::Cancelled);
    };
    fs::write(path, data)?;
    Ok(SubmitOutcome::Saved)
}

pub fn pick_catalog_file<F>(callback: F) -> Result<()>
where
    F: Fn(String) + 'static,
{
    let filename = rfd::FileDialog::default()
        .set_title("Import Vaccine Catalog")
        .add_filter("RON Files", &["ron", "RON"])
        .pick_file();
    if let Some(name) = filename {
        let data = fs::read_to_string(name)?;
        callback(data);
    }
    Ok(())
}
