//! Surveyed-site table and nearest-site lookup.
//!
//! The table is loaded once at startup and never mutated afterwards; every
//! query computes its distances locally so the index can be shared freely
//! between concurrent requests.
//!
//! Distance is planar Euclidean over raw degree values. That is only a fair
//! approximation for the sub-kilometer survey areas this serves, and it
//! decides which site wins, so it must not be swapped for a geodesic formula.

use std::{fs::File, io::Read, path::Path};

use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, info, warn};
use pet_estimator_core::Reading;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{coordinates::try_parse_dms, QueryPoint, StoredIndices};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to open survey file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse survey csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read survey workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("survey workbook has no worksheets")]
    NoWorksheet,
    #[error("unsupported survey file type: {0}")]
    UnsupportedFormat(String),
    #[error("survey table is missing required column: {0}")]
    MissingColumn(&'static str),
}

/// The dataset has no site that can be located; nothing can be estimated
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("no surveyed site has valid coordinates")]
pub struct NoValidSites;

/// The nearest site has a blank cell the request needed
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("nearest site {site} has no recorded {field}")]
pub struct MissingMeasurement {
    pub site: String,
    pub field: &'static str,
}

/// Header plus rows, every cell as text, before any interpretation
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Load a `.csv` export or a workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`).
    ///
    /// `sheet` selects a worksheet by name; the first worksheet is used when unset.
    pub fn load(path: &Path, sheet: Option<&str>) -> Result<Self, Error> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => {
                let file = File::open(path).map_err(|source| Error::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_csv_reader(file)
            }
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::from_workbook(path, sheet),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = vec![];
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn from_workbook(path: &Path, sheet: Option<&str>) -> Result<Self, Error> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet_name = match sheet {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or(Error::NoWorksheet)?,
        };
        debug!("reading worksheet {:?} from {}", sheet_name, path.display());

        let range = workbook.worksheet_range(&sheet_name)?;
        let mut rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());
        let headers = rows.next().unwrap_or_default();
        Ok(Self {
            headers,
            rows: rows.collect(),
        })
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        // Excel escapes carriage returns inside strings
        Data::String(s) => s.replace("_x000D_", "\r"),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Trim, lowercase and drop embedded line breaks, so `" Air\r\nTemperature"`
/// and `"airtemperature"` name the same column.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(['\r', '\n'], "")
}

struct Columns {
    location_name: Option<usize>,
    lat: usize,
    lon: usize,
    svf: usize,
    gvi: usize,
    bvi: usize,
    air_temperature: usize,
    humidity: usize,
    wind_speed: usize,
}

impl Columns {
    fn resolve(headers: &[String]) -> Result<Self, Error> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_column_name(h)).collect();
        let find = |name: &'static str| normalized.iter().position(|h| h == name);
        let require = |name: &'static str| find(name).ok_or(Error::MissingColumn(name));

        Ok(Self {
            location_name: find("location_name"),
            lat: require("lat")?,
            lon: require("lon")?,
            svf: require("svf")?,
            gvi: require("gvi")?,
            bvi: require("bvi")?,
            air_temperature: require("airtemperature")?,
            humidity: require("humidity")?,
            wind_speed: require("windspeed")?,
        })
    }
}

/// One surveyed physical location. Blank or non-numeric measurement cells
/// are `None`; the row still takes part in nearest-site search.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SurveySite {
    pub location_name: Option<String>,
    pub lat_raw: String,
    pub lon_raw: String,
    /// `None` when `lat_raw` is not a valid `D;M;S` string
    pub lat_decimal: Option<f64>,
    /// `None` when `lon_raw` is not a valid `D;M;S` string
    pub lon_decimal: Option<f64>,
    pub svf: Option<f64>,
    pub gvi: Option<f64>,
    pub bvi: Option<f64>,
    pub air_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
}

impl SurveySite {
    fn from_row(row: &[String], columns: &Columns, row_number: usize) -> Self {
        let cell = |index: usize| row.get(index).map(|c| c.trim()).unwrap_or_default();
        let measure = |index: usize, name: &str| -> Option<f64> {
            let text = cell(index);
            if text.is_empty() {
                return None;
            }
            let value = text.parse::<f64>().ok().filter(|v| v.is_finite());
            if value.is_none() {
                warn!(
                    "survey row {}: {} {:?} is not a number, treated as blank",
                    row_number, name, text
                );
            }
            value
        };

        let lat_raw = cell(columns.lat).to_string();
        let lon_raw = cell(columns.lon).to_string();

        Self {
            location_name: columns
                .location_name
                .map(cell)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            lat_decimal: decimal_or_log(&lat_raw, row_number, "lat"),
            lon_decimal: decimal_or_log(&lon_raw, row_number, "lon"),
            lat_raw,
            lon_raw,
            svf: measure(columns.svf, "svf"),
            gvi: measure(columns.gvi, "gvi"),
            bvi: measure(columns.bvi, "bvi"),
            air_temperature: measure(columns.air_temperature, "airtemperature"),
            humidity: measure(columns.humidity, "humidity"),
            wind_speed: measure(columns.wind_speed, "windspeed"),
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat_decimal.zip(self.lon_decimal)
    }

    pub fn name(&self) -> &str {
        self.location_name.as_deref().unwrap_or("(unnamed site)")
    }

    pub fn indices(&self) -> StoredIndices {
        StoredIndices {
            svf: self.svf,
            gvi: self.gvi,
            bvi: self.bvi,
        }
    }

    pub fn missing(&self, field: &'static str) -> MissingMeasurement {
        MissingMeasurement {
            site: self.name().to_string(),
            field,
        }
    }

    /// Weather recorded at survey time, used when no live reading is available
    pub fn historical_reading(&self) -> Result<Reading, MissingMeasurement> {
        let require = |value: Option<f64>, field| value.ok_or_else(|| self.missing(field));
        Ok(Reading {
            air_temperature: require(self.air_temperature, "AirTemperature")?,
            humidity: require(self.humidity, "Humidity")?,
            wind_speed: require(self.wind_speed, "WindSpeed")?,
        })
    }

    /// Planar distance in degrees; `None` for sites that can't be located
    pub fn distance_to(&self, point: &QueryPoint) -> Option<f64> {
        let (lat, lon) = self.coordinates()?;
        let distance = ((lat - point.lat).powi(2) + (lon - point.lon).powi(2)).sqrt();
        distance.is_finite().then_some(distance)
    }
}

fn decimal_or_log(raw: &str, row_number: usize, column: &str) -> Option<f64> {
    match try_parse_dms(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(
                "survey row {}: {} {:?} excluded from search: {}",
                row_number, column, raw, e
            );
            None
        }
    }
}

/// The winning site of a nearest-neighbor query and its distance in degrees
#[derive(Debug, Clone, Copy)]
pub struct Nearest<'a> {
    pub site: &'a SurveySite,
    pub distance: f64,
}

/// Immutable, process-wide table of surveyed sites
#[derive(Debug, Clone, Default)]
pub struct SurveyIndex {
    sites: Vec<SurveySite>,
}

impl SurveyIndex {
    pub fn load(path: &Path, sheet: Option<&str>) -> Result<Self, Error> {
        info!("loading survey dataset from {}", path.display());
        Self::build(RawTable::load(path, sheet)?)
    }

    /// Interpret a raw table. Every non-blank row is kept; rows with
    /// unparseable coordinates never match a query.
    pub fn build(table: RawTable) -> Result<Self, Error> {
        let columns = Columns::resolve(&table.headers)?;

        let mut sites = Vec::with_capacity(table.rows.len());
        for (i, row) in table.rows.iter().enumerate() {
            // header is spreadsheet row 1
            let row_number = i + 2;
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            sites.push(SurveySite::from_row(row, &columns, row_number));
        }

        let index = Self { sites };
        info!(
            "survey index ready: {} sites, {} with valid coordinates",
            index.sites.len(),
            index.geocoded_count()
        );
        Ok(index)
    }

    pub fn sites(&self) -> &[SurveySite] {
        &self.sites
    }

    pub fn geocoded(&self) -> impl Iterator<Item = &SurveySite> {
        self.sites.iter().filter(|s| s.coordinates().is_some())
    }

    pub fn geocoded_count(&self) -> usize {
        self.geocoded().count()
    }

    /// Closest site with valid coordinates. Ties go to the earliest row.
    pub fn nearest(&self, point: &QueryPoint) -> Result<Nearest<'_>, NoValidSites> {
        let mut best: Option<Nearest<'_>> = None;
        for site in &self.sites {
            let Some(distance) = site.distance_to(point) else {
                continue;
            };
            match best {
                Some(current) if distance >= current.distance => {}
                _ => best = Some(Nearest { site, distance }),
            }
        }
        best.ok_or(NoValidSites)
    }
}
