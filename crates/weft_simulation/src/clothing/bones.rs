//! Bone-name matching between a clothing asset and the host skeleton.

/// Canonical form used for comparison: lowercase, `' '` and `'_'` as `'-'`.
#[must_use]
pub fn normalize_bone_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Maps each asset bone to a skeleton bone index.
///
/// An empty skeleton yields the identity mapping. A bone with no match maps
/// to index 0 and is reported.
#[must_use]
pub fn build_bone_mapping(asset_bones: &[String], skeleton: &[String]) -> Vec<u32> {
    if skeleton.is_empty() {
        return (0..asset_bones.len()).map(|i| u32::try_from(i).unwrap_or(u32::MAX)).collect();
    }

    let normalized: Vec<String> = skeleton.iter().map(|name| normalize_bone_name(name)).collect();
    asset_bones
        .iter()
        .map(|bone| {
            let key = normalize_bone_name(bone);
            match normalized.iter().position(|candidate| *candidate == key) {
                Some(index) => u32::try_from(index).unwrap_or(0),
                None => {
                    tracing::warn!("Clothing bone '{}' has no match in the skeleton; using bone 0", bone);
                    0
                }
            }
        })
        .collect()
}
