use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use tracing::info;
use waypoint_core::types::Coordinates;

use crate::error::GeoError;

/// One canonical place and the aliases that refer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCityEntry {
    pub canonical_name: String,
    pub country: String,
    pub coordinates: Coordinates,
    /// Case-insensitive aliases. Stored normalized.
    pub aliases: BTreeSet<String>,
}

/// Immutable alias table used to bias ambiguous place names.
///
/// Every alias maps to exactly one entry. Construction fails on duplicates so
/// that lookups are deterministic.
#[derive(Debug, Clone)]
pub struct GeoBiasTable {
    entries: Vec<GeoCityEntry>,
    alias_index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct TableFile {
    #[serde(default)]
    entries: Vec<GeoCityEntry>,
}

/// (canonical name, country, lat, lon, aliases)
type BuiltinRow = (&'static str, &'static str, f64, f64, &'static [&'static str]);

/// Bare city names belong to the internationally prominent place; same-named
/// localities need a qualifier ("paris texas", "london ontario").
const BUILTIN_ENTRIES: &[BuiltinRow] = &[
    ("Paris", "France", 48.8566, 2.3522, &["paris", "paris france", "paris fr"]),
    ("Paris", "United States", 33.6609, -95.5555, &["paris texas", "paris tx"]),
    ("London", "United Kingdom", 51.5074, -0.1278, &["london", "london uk", "london england"]),
    ("London", "Canada", 42.9849, -81.2453, &["london ontario", "london on"]),
    ("Amsterdam", "Netherlands", 52.3676, 4.9041, &["amsterdam", "amsterdam nl"]),
    (
        "Amsterdam Centraal",
        "Netherlands",
        52.3791,
        4.9003,
        &["amsterdam centraal", "amsterdam central", "amsterdam central station"],
    ),
    ("IJburglaan", "Netherlands", 52.3546, 4.9930, &["ijburglaan", "ijburg"]),
    ("Dam Square", "Netherlands", 52.3731, 4.8926, &["dam square"]),
    ("Rijksmuseum", "Netherlands", 52.3600, 4.8852, &["rijksmuseum"]),
    ("Berlin", "Germany", 52.5200, 13.4050, &["berlin"]),
    ("Brandenburg Gate", "Germany", 52.5163, 13.3777, &["brandenburg gate"]),
    ("Rome", "Italy", 41.9028, 12.4964, &["rome", "roma"]),
    ("Colosseum", "Italy", 41.8902, 12.4922, &["colosseum", "colosseo"]),
    ("Madrid", "Spain", 40.4168, -3.7038, &["madrid"]),
    ("Barcelona", "Spain", 41.3874, 2.1686, &["barcelona"]),
    ("Tokyo", "Japan", 35.6762, 139.6503, &["tokyo"]),
    ("Shibuya Crossing", "Japan", 35.6595, 139.7005, &["shibuya crossing"]),
    ("Sydney", "Australia", -33.8688, 151.2093, &["sydney"]),
    (
        "New York City",
        "United States",
        40.7128,
        -74.0060,
        &["new york", "new york city", "nyc", "manhattan"],
    ),
    ("San Francisco", "United States", 37.7749, -122.4194, &["san francisco"]),
    ("Los Angeles", "United States", 34.0522, -118.2437, &["los angeles"]),
    ("Chicago", "United States", 41.8781, -87.6298, &["chicago"]),
    ("Seattle", "United States", 47.6062, -122.3321, &["seattle"]),
    (
        "Portland",
        "United States",
        45.5152,
        -122.6784,
        &["portland", "portland oregon", "portland or"],
    ),
    ("Portland", "United States", 43.6591, -70.2568, &["portland maine", "portland me"]),
    (
        "Washington, D.C.",
        "United States",
        38.9072,
        -77.0369,
        &["washington dc", "washington d c", "dc"],
    ),
    ("Eiffel Tower", "France", 48.8584, 2.2945, &["eiffel tower", "tour eiffel"]),
    ("Louvre Museum", "France", 48.8606, 2.3376, &["louvre", "louvre museum"]),
    ("Times Square", "United States", 40.7580, -73.9855, &["times square"]),
    ("Central Park", "United States", 40.7829, -73.9654, &["central park"]),
    (
        "Empire State Building",
        "United States",
        40.7484,
        -73.9857,
        &["empire state building"],
    ),
    (
        "Golden Gate Bridge",
        "United States",
        37.8199,
        -122.4783,
        &["golden gate bridge", "golden gate"],
    ),
    ("Hollywood", "United States", 34.0928, -118.3287, &["hollywood"]),
    (
        "Los Angeles International Airport",
        "United States",
        33.9416,
        -118.4085,
        &["lax", "los angeles international airport"],
    ),
    ("Willis Tower", "United States", 41.8789, -87.6359, &["willis tower", "sears tower"]),
    ("Buckingham Palace", "United Kingdom", 51.5014, -0.1419, &["buckingham palace"]),
    ("Big Ben", "United Kingdom", 51.5007, -0.1246, &["big ben"]),
];

static BUILTIN: LazyLock<Arc<GeoBiasTable>> = LazyLock::new(|| {
    let entries = BUILTIN_ENTRIES
        .iter()
        .map(|(name, country, lat, lon, aliases)| GeoCityEntry {
            canonical_name: name.to_string(),
            country: country.to_string(),
            coordinates: Coordinates::new(*lat, *lon),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        })
        .collect();
    Arc::new(GeoBiasTable::new(entries).expect("Invalid built-in bias table"))
});

/// Lower-case, replace punctuation with spaces, and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl GeoBiasTable {
    /// Build a table, normalizing aliases and rejecting invalid or ambiguous entries.
    pub fn new(entries: Vec<GeoCityEntry>) -> Result<Self, GeoError> {
        let mut normalized_entries = Vec::with_capacity(entries.len());
        let mut alias_index: HashMap<String, usize> = HashMap::new();

        for (idx, mut entry) in entries.into_iter().enumerate() {
            if !entry.coordinates.is_valid() {
                return Err(GeoError::InvalidEntry(format!(
                    "{} has out-of-range coordinates ({})",
                    entry.canonical_name, entry.coordinates
                )));
            }

            let aliases: BTreeSet<String> = entry
                .aliases
                .iter()
                .map(|a| normalize(a))
                .filter(|a| !a.is_empty())
                .collect();
            if aliases.is_empty() {
                return Err(GeoError::InvalidEntry(format!(
                    "{} has no aliases",
                    entry.canonical_name
                )));
            }

            for alias in &aliases {
                if let Some(&existing) = alias_index.get(alias) {
                    let first: &GeoCityEntry = &normalized_entries[existing];
                    return Err(GeoError::DuplicateAlias {
                        alias: alias.clone(),
                        first: format!("{} ({})", first.canonical_name, first.country),
                        second: format!("{} ({})", entry.canonical_name, entry.country),
                    });
                }
                alias_index.insert(alias.clone(), idx);
            }

            entry.aliases = aliases;
            normalized_entries.push(entry);
        }

        Ok(Self {
            entries: normalized_entries,
            alias_index,
        })
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Arc<GeoBiasTable> {
        Arc::clone(&BUILTIN)
    }

    /// Parse a table from TOML (`[[entries]]` array of [`GeoCityEntry`]).
    pub fn from_toml_str(content: &str) -> Result<Self, GeoError> {
        let file: TableFile = toml::from_str(content)?;
        Self::new(file.entries)
    }

    /// Load a table from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, GeoError> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_toml_str(&content)?;
        info!(
            entries = table.len(),
            "Geographic bias table loaded from {}",
            path.display()
        );
        Ok(table)
    }

    /// Look up an already-normalized alias.
    pub fn exact(&self, alias: &str) -> Option<&GeoCityEntry> {
        self.alias_index.get(alias).map(|&idx| &self.entries[idx])
    }

    /// All (alias, entry index) pairs.
    pub(crate) fn aliases(&self) -> impl Iterator<Item = (&str, usize)> {
        self.alias_index.iter().map(|(a, &idx)| (a.as_str(), idx))
    }

    pub(crate) fn entry(&self, idx: usize) -> &GeoCityEntry {
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[GeoCityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry(name: &str, country: &str, aliases: &[&str]) -> GeoCityEntry {
        GeoCityEntry {
            canonical_name: name.to_string(),
            country: country.to_string(),
            coordinates: Coordinates::new(10.0, 20.0),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Paris,   France! "), "paris france");
        assert_eq!(normalize("Washington D.C."), "washington d c");
        assert_eq!(normalize("IJburglaan"), "ijburglaan");
        assert_eq!(normalize("???"), "");
    }

    #[test]
    fn test_builtin_table_is_valid() {
        let table = GeoBiasTable::builtin();
        assert!(!table.is_empty());
        let paris = table.exact("paris").unwrap();
        assert_eq!(paris.country, "France");
        assert_eq!(paris.coordinates, Coordinates::new(48.8566, 2.3522));
        let paris_tx = table.exact("paris texas").unwrap();
        assert_eq!(paris_tx.country, "United States");
    }

    #[test]
    fn test_aliases_are_normalized() {
        let table = GeoBiasTable::new(vec![entry("Foo", "X", &["  FOO Town "])]).unwrap();
        assert!(table.exact("foo town").is_some());
        assert!(table.exact("FOO Town").is_none());
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let result = GeoBiasTable::new(vec![
            entry("Springfield", "United States", &["springfield"]),
            entry("Springfield", "Australia", &["Springfield"]),
        ]);
        assert!(matches!(result, Err(GeoError::DuplicateAlias { ref alias, .. }) if alias == "springfield"));
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let mut bad = entry("Nowhere", "X", &["nowhere"]);
        bad.coordinates = Coordinates::new(120.0, 0.0);
        assert!(matches!(
            GeoBiasTable::new(vec![bad]),
            Err(GeoError::InvalidEntry(_))
        ));

        assert!(matches!(
            GeoBiasTable::new(vec![entry("Empty", "X", &["!!"])]),
            Err(GeoError::InvalidEntry(_))
        ));
    }

    #[test]
    fn test_load_from_toml_file() {
        let content = r#"
[[entries]]
canonical_name = "Utrecht"
country = "Netherlands"
coordinates = { lat = 52.0907, lon = 5.1214 }
aliases = ["Utrecht", "utrecht centraal"]
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let table = GeoBiasTable::from_toml_file(file.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.exact("utrecht").unwrap().country, "Netherlands");
        assert!(table.exact("utrecht centraal").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let result = GeoBiasTable::from_toml_file(Path::new("/nonexistent/bias.toml"));
        assert!(matches!(result, Err(GeoError::Io(_))));
    }

    #[test]
    fn test_load_malformed_toml() {
        let result = GeoBiasTable::from_toml_str("[[entries]\ncanonical_name = ");
        assert!(matches!(result, Err(GeoError::Parse(_))));
    }
}
