//! County clerk contacts, ZIP-to-county guesses, and the early voting and dropbox sites
//! shown next to them.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;

/// Election office contact for one county.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clerk {
    pub county: String,
    #[serde(default)]
    pub officer: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub fax: String,
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

/// An early voting site or ballot dropbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSite {
    pub county: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub hours: String,
}

#[derive(Debug, Deserialize)]
struct ZipRow {
    zip: String,
    county: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("unable to open directory file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed directory csv: {0}")]
    Csv(#[from] csv::Error),
}

fn county_key(county: &str) -> String {
    county.trim().to_ascii_lowercase()
}

fn zip5(zip: &str) -> Option<String> {
    let digits: String = zip.trim().chars().take(5).collect();
    if digits.len() == 5 && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

fn open(path: &Path) -> Result<File, DirectoryError> {
    File::open(path).map_err(|source| DirectoryError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// County lookups by clerk and by ZIP code.
#[derive(Debug, Clone, Default)]
pub struct CountyDirectory {
    clerks: HashMap<String, Clerk>,
    zip_counties: HashMap<String, String>,
    early_voting: HashMap<String, Vec<VotingSite>>,
    dropboxes: HashMap<String, Vec<VotingSite>>,
}

fn load_sites<R: Read>(
    reader: R,
    into: &mut HashMap<String, Vec<VotingSite>>,
) -> Result<usize, DirectoryError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut loaded = 0;
    for row in csv.deserialize::<VotingSite>() {
        let site = row?;
        into.entry(county_key(&site.county)).or_default().push(site);
        loaded += 1;
    }
    Ok(loaded)
}

impl CountyDirectory {
    pub fn from_config(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let mut directory = Self::default();
        if let Some(path) = &config.clerks_csv {
            directory.load_clerks(open(path)?)?;
        }
        if let Some(path) = &config.zipcodes_csv {
            directory.load_zip_codes(open(path)?)?;
        }
        if let Some(path) = &config.early_voting_csv {
            directory.load_early_voting(open(path)?)?;
        }
        if let Some(path) = &config.dropboxes_csv {
            directory.load_dropboxes(open(path)?)?;
        }
        Ok(directory)
    }

    /// Columns: `county,officer,email,phone,fax,address1,address2,city,state,zip`.
    pub fn load_clerks<R: Read>(&mut self, reader: R) -> Result<usize, DirectoryError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut loaded = 0;
        for row in csv.deserialize::<Clerk>() {
            let clerk = row?;
            self.clerks.insert(county_key(&clerk.county), clerk);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Columns: `zip,county`.
    pub fn load_zip_codes<R: Read>(&mut self, reader: R) -> Result<usize, DirectoryError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut loaded = 0;
        for row in csv.deserialize::<ZipRow>() {
            let row = row?;
            if let Some(zip) = zip5(&row.zip) {
                self.zip_counties.insert(zip, row.county);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Columns: `county,name,address,city,zip,hours`.
    pub fn load_early_voting<R: Read>(&mut self, reader: R) -> Result<usize, DirectoryError> {
        load_sites(reader, &mut self.early_voting)
    }

    /// Same columns as the early voting table.
    pub fn load_dropboxes<R: Read>(&mut self, reader: R) -> Result<usize, DirectoryError> {
        load_sites(reader, &mut self.dropboxes)
    }

    pub fn early_voting_locations(&self, county: &str) -> &[VotingSite] {
        self.early_voting
            .get(&county_key(county))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dropboxes(&self, county: &str) -> &[VotingSite] {
        self.dropboxes
            .get(&county_key(county))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_by_county(&self, county: &str) -> Option<&Clerk> {
        self.clerks.get(&county_key(county))
    }

    pub fn guess_county(&self, zip: &str) -> Option<String> {
        zip5(zip).and_then(|zip| self.zip_counties.get(&zip).cloned())
    }
}
