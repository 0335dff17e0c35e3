use std::collections::HashSet;

use frontend::{Package, Requirement};

/// Delta between two release snapshots of the same package. Requirements
/// are compared by name only; list order follows the snapshot the
/// requirement came from.
pub struct PackageDiff<'a> {
    old: &'a Package,
    new: &'a Package,
}

impl<'a> PackageDiff<'a> {
    pub fn new(old: &'a Package, new: &'a Package) -> PackageDiff<'a> {
        PackageDiff { old, new }
    }

    pub fn new_version(&self) -> &str {
        &self.new.version
    }

    /// Run requirements of the new release that the old release does not
    /// have.
    pub fn new_requirements(&self) -> Vec<&'a Requirement> {
        only_in(
            self.new.requirements_for("run"),
            self.old.requirements_for("run"),
        )
    }

    /// Run requirements of the old release that the new release dropped.
    pub fn deleted_requirements(&self) -> Vec<&'a Requirement> {
        only_in(
            self.old.requirements_for("run"),
            self.new.requirements_for("run"),
        )
    }

    /// Requirements present in both releases whose version constraint
    /// changed.
    ///
    /// TODO: constraint-change detection is not implemented; this always
    /// returns an empty list.
    pub fn updated_requirements(&self) -> Vec<&'a Requirement> {
        Vec::new()
    }
}

fn only_in<'a>(kept: &'a [Requirement], other: &[Requirement]) -> Vec<&'a Requirement> {
    let names: HashSet<&str> = other.iter().map(|r| r.name.as_str()).collect();
    kept.iter()
        .filter(|r| !names.contains(r.name.as_str()))
        .collect()
}
