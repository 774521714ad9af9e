use std::collections::BTreeMap;

use log::debug;
use statrs::statistics::Statistics;

use crate::chemistry::nomenclature::Nomenclature;
use crate::data::compound::Compound;
use crate::error::{AnalysisError, Result};

/// Log P variance at or below which a set of anchors identifies no slope.
pub const DEGENERACY_EPSILON: f64 = 1e-10;

/// Population variance of `values`, `0.0` for an empty slice.
///
/// # Examples
///
/// ```
/// use rtcore::data::group::feature_variance;
///
/// assert_eq!(feature_variance(&[2.0, 2.0, 2.0]), 0.0);
/// assert_eq!(feature_variance(&[1.0, 3.0]), 1.0);
/// assert_eq!(feature_variance(&[]), 0.0);
/// ```
pub fn feature_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().population_variance()
}

/// Compounds sharing a prefix.
///
/// Members are indices into the owning [`GroupedDataset`]. The anchor statistics
/// are derived from the membership when the group is built, and a group is only
/// ever rebuilt, never edited, so they cannot drift from it.
#[derive(Clone, Debug)]
pub struct Group {
    prefix: String,
    family: Option<String>,
    members: Vec<usize>,
    anchors: Vec<usize>,
    feature_variance: f64,
}

impl Group {
    pub fn new(prefix: String, family: Option<String>, members: Vec<usize>, compounds: &[Compound]) -> Self {
        let anchors: Vec<usize> = members.iter().copied().filter(|&i| compounds[i].is_anchor).collect();
        let log_p: Vec<f64> = anchors.iter().map(|&i| compounds[i].log_p).collect();

        Group {
            prefix,
            family,
            members,
            anchors,
            feature_variance: feature_variance(&log_p),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn anchors(&self) -> &[usize] {
        &self.anchors
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn feature_variance(&self) -> f64 {
        self.feature_variance
    }

    pub fn is_degenerate(&self) -> bool {
        self.feature_variance <= DEGENERACY_EPSILON
    }

    /// Anchors available to a prefix-level fit: none when the group is degenerate.
    pub fn usable_anchors(&self) -> usize {
        if self.is_degenerate() {
            0
        } else {
            self.anchor_count()
        }
    }

    pub fn non_anchors(&self, compounds: &[Compound]) -> Vec<usize> {
        self.members.iter().copied().filter(|&i| !compounds[i].is_anchor).collect()
    }
}

/// A dataset snapshot partitioned into prefix groups and family anchor pools.
#[derive(Clone, Debug)]
pub struct GroupedDataset {
    compounds: Vec<Compound>,
    groups: BTreeMap<String, Group>,
    family_anchors: BTreeMap<String, Vec<usize>>,
    anchors: Vec<usize>,
}

impl GroupedDataset {
    /// Parse every name, check the numeric preconditions and build the group map.
    ///
    /// Arguments:
    ///
    /// * `compounds` - the full dataset snapshot
    /// * `nomenclature` - naming rules used to derive prefix and family
    ///
    /// Returns:
    ///
    /// * `Result<GroupedDataset>` - `EmptyDataset` or `InvalidInput` on bad input
    pub fn build(compounds: &[Compound], nomenclature: &Nomenclature) -> Result<Self> {
        if compounds.is_empty() {
            return Err(AnalysisError::EmptyDataset);
        }

        let mut annotated = Vec::with_capacity(compounds.len());
        let mut members: BTreeMap<String, (Option<String>, Vec<usize>)> = BTreeMap::new();

        for (row, compound) in compounds.iter().enumerate() {
            compound.check(row)?;

            let (prefix, family) = nomenclature.parse(&compound.name);
            members
                .entry(prefix.clone())
                .or_insert_with(|| (family.clone(), Vec::new()))
                .1
                .push(row);

            let mut compound = compound.clone();
            compound.prefix = Some(prefix);
            compound.family = family;
            compound.outcome = None;
            annotated.push(compound);
        }

        let groups: BTreeMap<String, Group> = members
            .into_iter()
            .map(|(prefix, (family, rows))| {
                let group = Group::new(prefix.clone(), family, rows, &annotated);
                (prefix, group)
            })
            .collect();

        let mut family_anchors: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for group in groups.values() {
            if let Some(family) = group.family() {
                family_anchors
                    .entry(family.to_string())
                    .or_default()
                    .extend_from_slice(group.anchors());
            }
        }
        for anchors in family_anchors.values_mut() {
            anchors.sort_unstable();
        }

        let anchors: Vec<usize> = (0..annotated.len()).filter(|&i| annotated[i].is_anchor).collect();

        debug!(
            "grouped {} compounds into {} prefixes, {} families, {} anchors",
            annotated.len(),
            groups.len(),
            family_anchors.len(),
            anchors.len()
        );

        Ok(GroupedDataset {
            compounds: annotated,
            groups,
            family_anchors,
            anchors,
        })
    }

    pub fn compounds(&self) -> &[Compound] {
        &self.compounds
    }

    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    pub fn group(&self, prefix: &str) -> Option<&Group> {
        self.groups.get(prefix)
    }

    /// Anchors of every prefix mapped to `family`, in dataset order.
    pub fn family_anchors(&self, family: &str) -> &[usize] {
        self.family_anchors.get(family).map(|a| a.as_slice()).unwrap_or(&[])
    }

    pub fn anchors(&self) -> &[usize] {
        &self.anchors
    }

    /// `(log_p, rt)` columns for a set of row indices.
    pub fn points(&self, rows: &[usize]) -> (Vec<f64>, Vec<f64>) {
        rows.iter()
            .map(|&i| (self.compounds[i].log_p, self.compounds[i].rt))
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Vec<Compound> {
        vec![
            Compound::new("GM3(34:1;O2)", 8.0, 2.0, true),
            Compound::new("GM3(36:1;O2)", 9.0, 3.0, true),
            Compound::new("GM3(38:1;O2)", 10.1, 4.0, false),
            Compound::new("GM3+OAc(36:1;O2)", 9.5, 3.2, true),
            Compound::new("GD1a(36:1;O2)", 6.0, 1.5, true),
            Compound::new("GD1a(38:1;O2)", 6.1, 1.5, true),
        ]
    }

    #[test]
    fn test_group_anchor_counts() {
        let data = GroupedDataset::build(&dataset(), &Nomenclature::ganglioside()).unwrap();
        let gm3 = data.group("GM3").unwrap();
        assert_eq!(gm3.members().len(), 3);
        assert_eq!(gm3.anchor_count(), 2);
        assert!((gm3.feature_variance() - 0.25).abs() < 1e-12);
        assert!(!gm3.is_degenerate());
        assert_eq!(gm3.non_anchors(data.compounds()), vec![2]);
    }

    #[test]
    fn test_identical_log_p_is_degenerate() {
        let data = GroupedDataset::build(&dataset(), &Nomenclature::ganglioside()).unwrap();
        let gd1a = data.group("GD1a").unwrap();
        assert_eq!(gd1a.anchor_count(), 2);
        assert!(gd1a.is_degenerate());
        assert_eq!(gd1a.usable_anchors(), 0);
    }

    #[test]
    fn test_family_pool_spans_prefixes() {
        let data = GroupedDataset::build(&dataset(), &Nomenclature::ganglioside()).unwrap();
        assert_eq!(data.family_anchors("GM3"), &[0, 1, 3]);
        assert_eq!(data.family_anchors("GD1"), &[4, 5]);
        assert!(data.family_anchors("GT1").is_empty());
        assert_eq!(data.anchors().len(), 5);
    }

    #[test]
    fn test_compounds_are_annotated() {
        let data = GroupedDataset::build(&dataset(), &Nomenclature::ganglioside()).unwrap();
        let compound = &data.compounds()[3];
        assert_eq!(compound.prefix.as_deref(), Some("GM3+OAc"));
        assert_eq!(compound.family.as_deref(), Some("GM3"));
    }

    #[test]
    fn test_empty_dataset() {
        let result = GroupedDataset::build(&[], &Nomenclature::ganglioside());
        assert!(matches!(result, Err(AnalysisError::EmptyDataset)));
    }
}
