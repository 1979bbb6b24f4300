///! Site/serial catalog
///!
///! Groups normalized metadata rows by site, builds the serial lookup maps
///! the query layer parameterizes on, and assigns each serial a stable
///! display color. Rebuilt whenever the metadata store is re-fetched.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::module::metastore::types::SensorDetail;
use crate::module::serial::Serial;

/// RGB triple for display.
pub type Rgb = [u8; 3];

/// Fixed display palette; serials are assigned `PALETTE[i % len]` by their
/// position in the ascending unique-serial list.
pub const COLOR_PALETTE: [Rgb; 8] = [
    [230, 120, 50],
    [78, 171, 211],
    [137, 68, 171],
    [58, 183, 94],
    [209, 140, 32],
    [46, 134, 193],
    [194, 62, 93],
    [84, 110, 122],
];

/// Site attributes looked up by serial.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteInfo {
    pub label: String,
    pub icao: String,
    pub airport: String,
    pub country_name: String,
    pub country_iso3: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One named site with its ordered child serials.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSite {
    pub icao: String,
    pub airport: String,
    pub country_name: String,
    pub country_iso3: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// De-duplicated, in input order.
    pub serials: Vec<Serial>,
}

/// The catalog triple plus the derived color assignment.
#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    /// Ascending, duplicate-free.
    pub all_serials: Vec<Serial>,
    /// Exactly one entry per serial in `all_serials`.
    pub serial_to_site: HashMap<Serial, SiteInfo>,
    /// Site label -> site attributes + serial list. BTreeMap keeps site
    /// iteration deterministic for select options.
    pub monitor_sites: BTreeMap<String, MonitorSite>,
    colors: HashMap<Serial, Rgb>,
}

impl SiteCatalog {
    /// Build the catalog from normalized metadata rows.
    ///
    /// Deterministic for identical input ordering: serials accumulate per
    /// site in input order (first occurrence wins on duplicates), while the
    /// global serial list and the colors derived from it depend only on the
    /// sorted serial set.
    pub fn build(details: &[SensorDetail]) -> Self {
        let mut serials: Vec<Serial> = Vec::new();
        let mut serial_to_site: HashMap<Serial, SiteInfo> = HashMap::new();
        let mut monitor_sites: BTreeMap<String, MonitorSite> = BTreeMap::new();

        for detail in details {
            let label = site_label(&detail.icao, &detail.airport, detail.serial);
            let site = monitor_sites
                .entry(label.clone())
                .or_insert_with(|| MonitorSite {
                    icao: detail.icao.clone(),
                    airport: detail.airport.clone(),
                    country_name: detail.country_name.clone(),
                    country_iso3: detail.country_iso3.clone(),
                    latitude: detail.latitude,
                    longitude: detail.longitude,
                    serials: Vec::new(),
                });
            if !site.serials.contains(&detail.serial) {
                site.serials.push(detail.serial);
            }
            serials.push(detail.serial);
            serial_to_site.insert(
                detail.serial,
                SiteInfo {
                    label,
                    icao: detail.icao.clone(),
                    airport: detail.airport.clone(),
                    country_name: detail.country_name.clone(),
                    country_iso3: detail.country_iso3.clone(),
                    latitude: detail.latitude,
                    longitude: detail.longitude,
                },
            );
        }

        let unique: HashSet<Serial> = serials.iter().copied().collect();
        let mut all_serials: Vec<Serial> = unique.into_iter().collect();
        all_serials.sort_unstable();

        let colors = assign_colors(&all_serials);

        Self {
            all_serials,
            serial_to_site,
            monitor_sites,
            colors,
        }
    }

    pub fn contains(&self, serial: Serial) -> bool {
        self.serial_to_site.contains_key(&serial)
    }

    pub fn site(&self, serial: Serial) -> Option<&SiteInfo> {
        self.serial_to_site.get(&serial)
    }

    pub fn site_label(&self, serial: Serial) -> Option<&str> {
        self.serial_to_site.get(&serial).map(|s| s.label.as_str())
    }

    /// Display color for a serial; unknown serials fall back to the first
    /// palette entry.
    pub fn color(&self, serial: Serial) -> Rgb {
        self.colors.get(&serial).copied().unwrap_or(COLOR_PALETTE[0])
    }

    pub fn color_with_alpha(&self, serial: Serial, alpha: u8) -> [u8; 4] {
        let [r, g, b] = self.color(serial);
        [r, g, b, alpha]
    }

    pub fn color_hex(&self, serial: Serial) -> String {
        let [r, g, b] = self.color(serial);
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    pub fn is_empty(&self) -> bool {
        self.all_serials.is_empty()
    }
}

/// "ICAO (Airport Name)", falling back to the bare serial when both parts
/// are blank.
fn site_label(icao: &str, airport: &str, serial: Serial) -> String {
    if icao.is_empty() && airport.is_empty() {
        serial.to_string()
    } else {
        format!("{icao} ({airport})")
    }
}

fn assign_colors(sorted_serials: &[Serial]) -> HashMap<Serial, Rgb> {
    sorted_serials
        .iter()
        .enumerate()
        .map(|(i, &serial)| (serial, COLOR_PALETTE[i % COLOR_PALETTE.len()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(serial: Serial, icao: &str, airport: &str) -> SensorDetail {
        SensorDetail {
            id: format!("rec-{serial}"),
            serial,
            icao: icao.to_string(),
            airport: airport.to_string(),
            country_name: "Sweden".to_string(),
            country_iso3: "SWE".to_string(),
            latitude: Some(59.65),
            longitude: Some(17.92),
        }
    }

    #[test]
    fn test_all_serials_sorted_unique() {
        let details = vec![
            detail(30, "ESSA", "Arlanda"),
            detail(-10, "ESSA", "Arlanda"),
            detail(20, "EYVI", "Vilnius"),
            detail(30, "ESSA", "Arlanda"),
        ];
        let catalog = SiteCatalog::build(&details);
        assert_eq!(catalog.all_serials, vec![-10, 20, 30]);
        assert_eq!(catalog.serial_to_site.len(), catalog.all_serials.len());
        for serial in &catalog.all_serials {
            assert!(catalog.contains(*serial));
        }
    }

    #[test]
    fn test_site_serials_keep_input_order_without_duplicates() {
        let details = vec![
            detail(30, "ESSA", "Arlanda"),
            detail(-10, "ESSA", "Arlanda"),
            detail(30, "ESSA", "Arlanda"),
        ];
        let catalog = SiteCatalog::build(&details);
        let site = &catalog.monitor_sites["ESSA (Arlanda)"];
        assert_eq!(site.serials, vec![30, -10]);
    }

    #[test]
    fn test_label_falls_back_to_serial() {
        let details = vec![detail(77, "", "")];
        let catalog = SiteCatalog::build(&details);
        assert_eq!(catalog.site_label(77), Some("77"));
        assert!(catalog.monitor_sites.contains_key("77"));
    }

    #[test]
    fn test_colors_follow_sorted_order_modulo_palette() {
        // Ten serials: index 8 and 9 wrap around the 8-entry palette.
        let details: Vec<SensorDetail> =
            (0..10).map(|i| detail(i * 5, "ESSA", "Arlanda")).collect();
        let catalog = SiteCatalog::build(&details);
        for (i, &serial) in catalog.all_serials.iter().enumerate() {
            assert_eq!(catalog.color(serial), COLOR_PALETTE[i % 8]);
        }
        assert_eq!(catalog.color(40), COLOR_PALETTE[0]);
        assert_eq!(catalog.color(45), COLOR_PALETTE[1]);
    }

    #[test]
    fn test_colors_deterministic_across_rebuilds() {
        let details = vec![
            detail(5, "ESSA", "Arlanda"),
            detail(-3, "EYVI", "Vilnius"),
            detail(12, "UGTB", "Tbilisi"),
        ];
        let a = SiteCatalog::build(&details);
        let b = SiteCatalog::build(&details);
        for serial in &a.all_serials {
            assert_eq!(a.color(*serial), b.color(*serial));
            assert_eq!(a.color_hex(*serial), b.color_hex(*serial));
        }
    }

    #[test]
    fn test_unknown_serial_color_fallback() {
        let catalog = SiteCatalog::build(&[]);
        assert_eq!(catalog.color(999), COLOR_PALETTE[0]);
        assert_eq!(catalog.color_with_alpha(999, 80), [230, 120, 50, 80]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_color_hex_format() {
        let details = vec![detail(1, "ESSA", "Arlanda")];
        let catalog = SiteCatalog::build(&details);
        assert_eq!(catalog.color_hex(1), "#e67832");
    }
}
