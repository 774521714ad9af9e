use std::collections::HashMap;

use regex::Regex;

use crate::error::{AnalysisError, Result};

/// Ganglioside class codes, listed so that every code precedes any shorter code it starts with.
pub const GANGLIOSIDE_CLASSES: &[&str] = &[
    "GM1a", "GM1b", "GD1a", "GD1b", "GD1c", "GT1a", "GT1b", "GT1c", "GQ1b", "GQ1c", "GP1c",
    "GM1", "GM2", "GM3", "GM4", "GD1", "GD2", "GD3", "GT1", "GT2", "GT3", "GQ1", "GP1",
];

/// Sugar and ester units that can be appended to a class code with `+`.
pub const SUGAR_MODIFIERS: &[&str] = &["HexNAc", "NeuAc", "NeuGc", "dHex", "Hex", "OAc", "Fuc"];

/// Families keyed by parent class: isomers plus the modified forms of the parent.
pub const GANGLIOSIDE_FAMILIES: &[(&str, &[&str])] = &[
    ("GM1", &["GM1", "GM1a", "GM1b", "GM1+HexNAc", "GM1+dHex", "GM1+OAc"]),
    ("GM2", &["GM2", "GM2+OAc"]),
    ("GM3", &["GM3", "GM3+OAc", "GM3+NeuGc"]),
    ("GD1", &["GD1", "GD1a", "GD1b", "GD1c", "GD1+dHex", "GD1+HexNAc", "GD1+OAc", "GD1a+OAc"]),
    ("GD2", &["GD2", "GD2+OAc"]),
    ("GD3", &["GD3", "GD3+OAc"]),
    ("GT1", &["GT1", "GT1a", "GT1b", "GT1c", "GT1+dHex", "GT1+OAc"]),
    ("GT3", &["GT3", "GT3+OAc"]),
    ("GQ1", &["GQ1", "GQ1b", "GQ1c", "GQ1+dHex"]),
    ("GP1", &["GP1", "GP1c"]),
];

/// Naming rules that turn a compound name into its group prefix and family.
///
/// Built once per process and shared by reference; parsing never mutates it.
#[derive(Clone, Debug)]
pub struct Nomenclature {
    modified_class: Option<Regex>,
    canonical_codes: Vec<String>,
    families: HashMap<String, String>,
}

impl Default for Nomenclature {
    fn default() -> Self {
        Nomenclature::ganglioside()
    }
}

impl Nomenclature {
    /// Build a nomenclature from explicit class codes, modifiers and a family table.
    ///
    /// Arguments:
    ///
    /// * `class_codes` - canonical class codes, any order
    /// * `modifiers` - units that may follow a class code after `+`
    /// * `families` - `(family, members)` pairs; a prefix may belong to one family only
    ///
    /// Returns:
    ///
    /// * `Result<Nomenclature>` - error if a prefix is listed in two families
    ///
    /// # Examples
    ///
    /// ```
    /// use rtcore::chemistry::nomenclature::Nomenclature;
    ///
    /// let nomenclature = Nomenclature::new(&["PC", "PCO"], &["Na"], &[("PC", &["PC", "PCO"][..])]).unwrap();
    /// let (prefix, family) = nomenclature.parse("PCO(34:1)");
    /// assert_eq!(prefix, "PCO");
    /// assert_eq!(family.as_deref(), Some("PC"));
    /// ```
    pub fn new(class_codes: &[&str], modifiers: &[&str], families: &[(&str, &[&str])]) -> Result<Self> {
        let (nomenclature, conflicts) = Nomenclature::from_tables(class_codes, modifiers, families);

        if let Some(conflict) = conflicts.first() {
            return Err(AnalysisError::InvalidSettings(conflict.clone()));
        }
        if nomenclature.modified_class.is_none() && !class_codes.is_empty() && !modifiers.is_empty() {
            return Err(AnalysisError::InvalidSettings("nomenclature pattern failed to compile".to_string()));
        }
        Ok(nomenclature)
    }

    /// Ganglioside naming, e.g. `GD1a(36:1;O2)` or `GM3+OAc(36:1;O2)`.
    pub fn ganglioside() -> Self {
        Nomenclature::from_tables(GANGLIOSIDE_CLASSES, SUGAR_MODIFIERS, GANGLIOSIDE_FAMILIES).0
    }

    fn from_tables(class_codes: &[&str], modifiers: &[&str], families: &[(&str, &[&str])]) -> (Self, Vec<String>) {
        let mut canonical_codes: Vec<String> = class_codes.iter().map(|c| c.to_string()).collect();
        // longest first so that e.g. GD1a is tried before GD1
        canonical_codes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        canonical_codes.dedup();

        let modified_class = if canonical_codes.is_empty() || modifiers.is_empty() {
            None
        } else {
            let mut units: Vec<&str> = modifiers.to_vec();
            units.sort_by(|a, b| b.len().cmp(&a.len()));

            let pattern = format!(
                r"(?:^|[^A-Za-z0-9])(?P<class>{})\+(?P<modifier>\d*(?:{}))",
                canonical_codes.iter().map(|c| regex::escape(c)).collect::<Vec<_>>().join("|"),
                units.iter().map(|m| regex::escape(m)).collect::<Vec<_>>().join("|"),
            );
            Regex::new(&pattern).ok()
        };

        let mut family_map: HashMap<String, String> = HashMap::new();
        let mut conflicts = Vec::new();
        for (family, members) in families {
            for member in members.iter() {
                if let Some(previous) = family_map.insert(member.to_string(), family.to_string()) {
                    if previous != *family {
                        conflicts.push(format!("prefix {} is mapped to both {} and {}", member, previous, family));
                    }
                }
            }
        }

        let nomenclature = Nomenclature {
            modified_class,
            canonical_codes,
            families: family_map,
        };
        (nomenclature, conflicts)
    }

    /// Split a compound name into `(prefix, family)`.
    ///
    /// Rules, first match wins: class code followed by `+<modifier>`, a canonical
    /// class code at the start of the name, the text before the first `(`, the
    /// whole name. Never fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use rtcore::chemistry::nomenclature::Nomenclature;
    ///
    /// let nomenclature = Nomenclature::ganglioside();
    /// assert_eq!(nomenclature.parse("GD1a(36:1;O2)").0, "GD1a");
    /// assert_eq!(nomenclature.parse("GD1+dHex(36:1;O2)").0, "GD1+dHex");
    /// assert_eq!(nomenclature.parse("unknown").1, None);
    /// ```
    pub fn parse(&self, name: &str) -> (String, Option<String>) {
        let prefix = self.prefix(name);
        let family = self.family_of(&prefix).map(|f| f.to_string());
        (prefix, family)
    }

    pub fn prefix(&self, name: &str) -> String {
        let name = name.trim();

        if let Some(regex) = &self.modified_class {
            if let Some(caps) = regex.captures(name) {
                if let (Some(class), Some(modifier)) = (caps.name("class"), caps.name("modifier")) {
                    return format!("{}+{}", class.as_str(), modifier.as_str());
                }
            }
        }

        if let Some(code) = self.canonical_codes.iter().find(|code| name.starts_with(code.as_str())) {
            return code.clone();
        }

        match name.find('(') {
            Some(idx) => name[..idx].trim_end().to_string(),
            None => name.to_string(),
        }
    }

    pub fn family_of(&self, prefix: &str) -> Option<&str> {
        self.families.get(prefix).map(|f| f.as_str())
    }
}
