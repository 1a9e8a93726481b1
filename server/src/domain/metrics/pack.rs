use std::collections::HashMap;

use super::family::MetricFamily;

/// Merge families that share a name.
///
/// The first occurrence keeps its position and metadata; samples from later
/// occurrences are appended to it. Order of first appearance is preserved.
pub fn pack(families: Vec<MetricFamily>) -> Vec<MetricFamily> {
    let mut packed: Vec<MetricFamily> = Vec::with_capacity(families.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(families.len());

    for family in families {
        match index.get(family.name()) {
            Some(&i) => packed[i].metric.extend(family.metric),
            None => {
                index.insert(family.name().to_string(), packed.len());
                packed.push(family);
            }
        }
    }
    packed
}
