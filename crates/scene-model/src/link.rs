use crate::{ObjectId, PropertyPath};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Describes a link from a start property to an end property.
///
/// Links have value semantics: only the start and end paths establish identity.
/// The validity flag is carried along but ignored by comparisons.
#[derive(Clone, Debug)]
pub struct LinkDescriptor {
    pub start: PropertyPath,
    pub end: PropertyPath,
    pub is_valid: bool,
}

impl LinkDescriptor {
    /// Creates a valid link.
    pub fn new(start: PropertyPath, end: PropertyPath) -> LinkDescriptor {
        LinkDescriptor {
            start,
            end,
            is_valid: true,
        }
    }

    pub fn with_validity(mut self, is_valid: bool) -> LinkDescriptor {
        self.is_valid = is_valid;
        self
    }

    pub fn start_object(&self) -> &ObjectId {
        self.start.object_id()
    }

    pub fn end_object(&self) -> &ObjectId {
        self.end.object_id()
    }
}

impl PartialEq for LinkDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for LinkDescriptor {}

impl Ord for LinkDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start).then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for LinkDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for LinkDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl fmt::Display for LinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)?;
        if !self.is_valid {
            f.write_str(" (invalid)")?;
        }
        Ok(())
    }
}
