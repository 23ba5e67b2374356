//! Object identities and property paths.
use crate::Error;
use smol_str::SmolStr;
use std::fmt;
use std::str::FromStr;

/// Identity of a scene object.
///
/// Object ids are opaque, non-empty strings. Two objects are the same object iff their ids are equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(SmolStr);

impl ObjectId {
    /// Creates an object id.
    ///
    /// The id must not be empty.
    pub fn new(id: impl Into<SmolStr>) -> ObjectId {
        let id = id.into();
        debug_assert!(!id.is_empty(), "object ids must not be empty");
        ObjectId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptyObjectId);
        }
        Ok(ObjectId(s.into()))
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId::new(id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Addresses a property (possibly nested) on a root object, or the root object itself.
///
/// A path with no property names (depth 0) addresses the object as a whole.
///
/// Paths are ordered by object first, then lexicographically by property names, so that all paths
/// on the same object are adjacent in ordered containers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyPath {
    object: ObjectId,
    names: Vec<SmolStr>,
}

impl PropertyPath {
    /// Returns the path addressing the object itself.
    pub fn root(object: ObjectId) -> PropertyPath {
        PropertyPath { object, names: vec![] }
    }

    /// Creates a path from a root object and a chain of property names.
    pub fn new<S: Into<SmolStr>>(object: ObjectId, names: impl IntoIterator<Item = S>) -> PropertyPath {
        let names: Vec<SmolStr> = names.into_iter().map(Into::into).collect();
        debug_assert!(names.iter().all(|n| !n.is_empty()), "property names must not be empty");
        PropertyPath { object, names }
    }

    /// Returns the path of the property named `name` nested under this one.
    pub fn child(&self, name: impl Into<SmolStr>) -> PropertyPath {
        let mut names = self.names.clone();
        names.push(name.into());
        PropertyPath {
            object: self.object.clone(),
            names,
        }
    }

    /// Returns the enclosing path, or `None` for a root path.
    pub fn parent(&self) -> Option<PropertyPath> {
        let (_, parent) = self.names.split_last()?;
        Some(PropertyPath {
            object: self.object.clone(),
            names: parent.to_vec(),
        })
    }

    /// The root object this path is relative to.
    pub fn object_id(&self) -> &ObjectId {
        &self.object
    }

    pub fn names(&self) -> &[SmolStr] {
        &self.names
    }

    /// Number of property names in the path. Zero for paths addressing an object.
    pub fn depth(&self) -> usize {
        self.names.len()
    }

    pub fn is_object(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of the addressed property (the last name in the chain).
    pub fn property_name(&self) -> Option<&SmolStr> {
        self.names.last()
    }

    /// Whether `other` addresses this property or a property nested under it, on the same object.
    pub fn contains(&self, other: &PropertyPath) -> bool {
        self.object == other.object && other.names.starts_with(&self.names)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.object)?;
        for name in self.names.iter() {
            write!(f, ".{name}")?;
        }
        Ok(())
    }
}

/// Parses `object.prop.sub` paths. The first component is the object id.
impl FromStr for PropertyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptyPath);
        }
        let mut components = s.split('.');
        // split always yields at least one item
        let object: ObjectId = components.next().unwrap_or_default().parse()?;
        let mut names = Vec::new();
        for (i, name) in components.enumerate() {
            if name.is_empty() {
                return Err(Error::EmptyComponent { index: i + 1 });
            }
            names.push(SmolStr::new(name));
        }
        Ok(PropertyPath { object, names })
    }
}
