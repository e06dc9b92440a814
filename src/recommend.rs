use anyhow::{bail, Result};
use jiff::civil::Date;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::OnceLock};

// Age in months at which the full catalog becomes recommended regardless of
// the bracket tables (14 years and up).
pub const FULL_SCHEDULE_MONTHS: u32 = 168;

/// One vaccine as known to the external catalog. Reference data; never
/// mutated by the form.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct VaccineCatalogEntry {
    pub id: u32,
    pub commercial_name: String,
    pub max_doses: u8,
}

/// The full vaccine catalog, in display order.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct VaccineCatalog {
    entries: Vec<VaccineCatalogEntry>,
}

impl Default for VaccineCatalog {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

impl VaccineCatalog {
    pub fn builtin() -> &'static VaccineCatalog {
        static CATALOG: OnceLock<VaccineCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            let entry = |id, name: &str, max_doses| VaccineCatalogEntry {
                id,
                commercial_name: name.to_owned(),
                max_doses,
            };
            VaccineCatalog {
                entries: vec![
                    entry(1, "BCG", 1),
                    entry(2, "Hepatitis B", 3),
                    entry(3, "Pentavalente", 4),
                    entry(4, "Rotavirus", 3),
                    entry(5, "IPV", 3),
                    entry(6, "Neumococo", 3),
                    entry(7, "Influenza", 2),
                    entry(8, "SRP", 2),
                    entry(9, "DPT", 1),
                    entry(10, "VPH", 2),
                    entry(11, "Td", 1),
                ],
            }
        })
    }

    pub fn from_ron(data: &str) -> Result<Self> {
        let catalog: VaccineCatalog = ron::from_str(data)?;
        if catalog.entries.is_empty() {
            bail!("catalog file contains no vaccines");
        }
        Ok(catalog)
    }

    pub fn get(&self, commercial_name: &str) -> Option<&VaccineCatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.commercial_name == commercial_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VaccineCatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Compute full months elapsed from `birthdate` to `today`, truncating toward
// the last completed month boundary. Rejects future birthdates rather than
// going negative.
pub fn age_in_months(birthdate: Date, today: Date) -> Result<u32> {
    if birthdate > today {
        bail!("birthdate {birthdate} is in the future");
    }
    let years = i32::from(today.year()) - i32::from(birthdate.year());
    let mut months = years * 12 + i32::from(today.month()) - i32::from(birthdate.month());
    if today.day() < birthdate.day() {
        months -= 1;
    }
    Ok(u32::try_from(months)?)
}

// One row of the national schedule: at `threshold_months` and beyond, each
// listed vaccine is recommended with at least the listed dose count.
struct AgeBracket {
    threshold_months: u32,
    requirements: &'static [(&'static str, u8)],
}

// Ordered by ascending threshold; later brackets may only raise dose counts
// for a vaccine already present, never remove it. Ages at or beyond
// FULL_SCHEDULE_MONTHS are handled separately and cover the whole catalog.
static AGE_BRACKETS: &[AgeBracket] = &[
    AgeBracket {
        threshold_months: 0,
        requirements: &[("BCG", 1), ("Hepatitis B", 1)],
    },
    AgeBracket {
        threshold_months: 2,
        requirements: &[
            ("Hepatitis B", 2),
            ("Pentavalente", 1),
            ("Rotavirus", 1),
            ("IPV", 1),
            ("Neumococo", 1),
        ],
    },
    AgeBracket {
        threshold_months: 4,
        requirements: &[
            ("Pentavalente", 2),
            ("Rotavirus", 2),
            ("IPV", 2),
            ("Neumococo", 2),
        ],
    },
    AgeBracket {
        threshold_months: 6,
        requirements: &[
            ("Hepatitis B", 3),
            ("Pentavalente", 3),
            ("Rotavirus", 3),
            ("IPV", 3),
            ("Influenza", 1),
        ],
    },
    AgeBracket {
        threshold_months: 7,
        requirements: &[("Influenza", 2)],
    },
    AgeBracket {
        threshold_months: 12,
        requirements: &[("SRP", 1), ("Neumococo", 3)],
    },
    AgeBracket {
        threshold_months: 18,
        requirements: &[("Pentavalente", 4)],
    },
    AgeBracket {
        threshold_months: 48,
        requirements: &[("DPT", 1), ("SRP", 2)],
    },
];

/// The cumulative set of recommended vaccines for one age, mapping each
/// vaccine name to its required dose count.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecommendationSet {
    required: BTreeMap<String, u8>,
}

impl RecommendationSet {
    pub fn contains(&self, commercial_name: &str) -> bool {
        self.required.contains_key(commercial_name)
    }

    pub fn required_doses(&self, commercial_name: &str) -> Option<u8> {
        self.required.get(commercial_name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.required.iter().map(|(name, doses)| (name.as_str(), *doses))
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }
}

// Merge every bracket at or below `age_months`, in ascending threshold order,
// with last-write-wins on the dose count. At FULL_SCHEDULE_MONTHS and beyond
// the whole catalog is recommended at full max_doses instead.
pub fn recommendations_for(age_months: u32, catalog: &VaccineCatalog) -> RecommendationSet {
    if age_months >= FULL_SCHEDULE_MONTHS {
        return RecommendationSet {
            required: catalog
                .iter()
                .map(|e| (e.commercial_name.clone(), e.max_doses))
                .collect(),
        };
    }

    let mut required = BTreeMap::new();
    for bracket in AGE_BRACKETS {
        if bracket.threshold_months > age_months {
            break;
        }
        for (name, doses) in bracket.requirements {
            required.insert((*name).to_owned(), *doses);
        }
    }
    RecommendationSet { required }
}

/// A catalog vaccine that is recommended at the current age; the unit the
/// form renders one dose row for.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RecommendedVaccine {
    pub vaccine_id: u32,
    pub commercial_name: String,
    pub max_doses: u8,
    pub required_doses: u8,
}

// Intersect the recommendation set with the catalog, preserving catalog
// order. Recommended names with no catalog entry are dropped with a warning;
// bad reference data should not block registering the vaccines we do know.
pub fn filter_catalog(set: &RecommendationSet, catalog: &VaccineCatalog) -> Vec<RecommendedVaccine> {
    for (name, _) in set.iter() {
        if catalog.get(name).is_none() {
            warn!("recommended vaccine {name:?} is missing from the catalog; dropping it");
        }
    }
    catalog
        .iter()
        .filter_map(|entry| {
            set.required_doses(&entry.commercial_name)
                .map(|required_doses| RecommendedVaccine {
                    vaccine_id: entry.id,
                    commercial_name: entry.commercial_name.clone(),
                    max_doses: entry.max_doses,
                    required_doses,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use jiff::civil::date;

    #[test]
    fn test_age_in_months_basic() -> Result<()> {
        let today = date(2025, 6, 15);
        assert_eq!(0, age_in_months(date(2025, 6, 15), today)?);
        assert_eq!(0, age_in_months(date(2025, 6, 1), today)?);
        assert_eq!(2, age_in_months(date(2025, 4, 15), today)?);
        // Day-of-month not reached yet: truncate to the last full month.
        assert_eq!(1, age_in_months(date(2025, 4, 16), today)?);
        assert_eq!(0, age_in_months(date(2025, 5, 16), today)?);
        // Year boundary.
        assert_eq!(6, age_in_months(date(2024, 12, 15), today)?);
        assert_eq!(24, age_in_months(date(2023, 6, 15), today)?);
        Ok(())
    }

    #[test]
    fn test_age_in_months_rejects_future() {
        let today = date(2025, 6, 15);
        assert!(age_in_months(date(2025, 6, 16), today).is_err());
        assert!(age_in_months(date(2026, 1, 1), today).is_err());
    }

    #[test]
    fn test_newborn_bracket_applies_at_age_zero() {
        let set = recommendations_for(0, VaccineCatalog::builtin());
        assert_eq!(2, set.len());
        assert_eq!(Some(1), set.required_doses("BCG"));
        assert_eq!(Some(1), set.required_doses("Hepatitis B"));
    }

    #[test]
    fn test_recommendations_grow_monotonically() {
        let catalog = VaccineCatalog::builtin();
        let at_5 = recommendations_for(5, catalog);
        assert!(at_5.contains("BCG"));
        assert!(at_5.contains("Hepatitis B"));
        assert!(!at_5.contains("SRP"));

        let at_14 = recommendations_for(14, catalog);
        for (name, doses) in at_5.iter() {
            assert!(at_14.required_doses(name).unwrap() >= doses);
        }
        for name in ["Rotavirus", "IPV", "Neumococo", "Pentavalente", "SRP"] {
            assert!(at_14.contains(name), "{name} missing at 14 months");
        }
    }

    #[test]
    fn test_later_brackets_raise_dose_counts() {
        let catalog = VaccineCatalog::builtin();
        assert_eq!(
            Some(1),
            recommendations_for(0, catalog).required_doses("Hepatitis B")
        );
        assert_eq!(
            Some(2),
            recommendations_for(2, catalog).required_doses("Hepatitis B")
        );
        assert_eq!(
            Some(3),
            recommendations_for(6, catalog).required_doses("Hepatitis B")
        );
    }

    #[test]
    fn test_full_schedule_at_168_months() {
        let catalog = VaccineCatalog::builtin();
        for age in [FULL_SCHEDULE_MONTHS, FULL_SCHEDULE_MONTHS + 1, 600] {
            let set = recommendations_for(age, catalog);
            assert_eq!(catalog.len(), set.len());
            for entry in catalog.iter() {
                assert_eq!(
                    Some(entry.max_doses),
                    set.required_doses(&entry.commercial_name)
                );
            }
        }
    }

    #[test]
    fn test_two_month_old_end_to_end() -> Result<()> {
        let catalog = VaccineCatalog::builtin();
        let age = age_in_months(date(2025, 4, 1), date(2025, 6, 1))?;
        assert_eq!(2, age);
        let recommended = filter_catalog(&recommendations_for(age, catalog), catalog);
        let names: Vec<&str> = recommended
            .iter()
            .map(|r| r.commercial_name.as_str())
            .collect();
        assert_eq!(
            vec!["BCG", "Hepatitis B", "Pentavalente", "Rotavirus", "IPV", "Neumococo"],
            names
        );
        for r in &recommended {
            let expect = if r.commercial_name == "Hepatitis B" { 2 } else { 1 };
            assert_eq!(expect, r.required_doses, "{}", r.commercial_name);
        }
        Ok(())
    }

    #[test]
    fn test_filter_drops_names_missing_from_catalog() -> Result<()> {
        let catalog = VaccineCatalog::from_ron(
            r#"(entries: [
                (id: 1, commercial_name: "BCG", max_doses: 1),
                (id: 5, commercial_name: "IPV", max_doses: 3),
            ])"#,
        )?;
        let set = recommendations_for(6, &catalog);
        let recommended = filter_catalog(&set, &catalog);
        let names: Vec<&str> = recommended
            .iter()
            .map(|r| r.commercial_name.as_str())
            .collect();
        assert_eq!(vec!["BCG", "IPV"], names);
        Ok(())
    }

    #[test]
    fn test_catalog_from_ron_rejects_empty() {
        assert!(VaccineCatalog::from_ron("(entries: [])").is_err());
        assert!(VaccineCatalog::from_ron("not ron at all").is_err());
    }

    #[test]
    fn test_bracket_doses_never_exceed_catalog_max() {
        let catalog = VaccineCatalog::builtin();
        for bracket in AGE_BRACKETS {
            for (name, doses) in bracket.requirements {
                let entry = catalog.get(name).unwrap_or_else(|| {
                    panic!("bracket at {}mo names unknown vaccine {name}", bracket.threshold_months)
                });
                assert!(*doses <= entry.max_doses, "{name} at {}mo", bracket.threshold_months);
            }
        }
    }

    #[test]
    fn test_brackets_sorted_by_threshold() {
        for pair in AGE_BRACKETS.windows(2) {
            assert!(pair[0].threshold_months < pair[1].threshold_months);
        }
    }
}
