//! Name-based collection hierarchy.

use bwkit_common::VaultObject;

/// Separator between levels of a collection name.
pub const SEPARATOR: char = '/';

/// Collections whose name starts with `<parent_name>/`.
///
/// This is a plain prefix match on names: every collection below the parent
/// qualifies, whatever its depth, and the parent itself does not. Input
/// order is preserved.
pub fn children_of<'a>(collections: &'a [VaultObject], parent_name: &str) -> Vec<&'a VaultObject> {
    let prefix = format!("{}{}", parent_name, SEPARATOR);
    collections
        .iter()
        .filter(|collection| {
            collection
                .name()
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .collect()
}

/// First collection named exactly `name`.
pub fn find_by_name<'a>(collections: &'a [VaultObject], name: &str) -> Option<&'a VaultObject> {
    collections
        .iter()
        .find(|collection| collection.name() == Some(name))
}
