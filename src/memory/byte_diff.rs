//! Value-grouped byte content of a memory plane
//!
//! A [`ByteDiff`] maps each distinct byte value to the offsets holding it,
//! split into an additions side and a deletions side. Grouping by value
//! keeps runs of identical content down to a single entry.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

/// Byte offset within a plane
pub type Offset = u64;

/// The content of one byte group: the value text plus the flags the engine
/// attaches to every group it emits.
///
/// Two groups with the same text but different flags are different values
/// (a concrete `5` and an unflushed `5` are not interchangeable).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ByteValue {
    /// Literal or symbolic-expression text
    pub token: String,
    pub concrete: bool,
    pub known_symbolic: bool,
    pub unflushed: bool,
}

impl ByteValue {
    pub fn new(
        token: impl Into<String>,
        concrete: bool,
        known_symbolic: bool,
        unflushed: bool,
    ) -> Self {
        Self {
            token: token.into(),
            concrete,
            known_symbolic,
            unflushed,
        }
    }

    /// A flushed concrete byte
    pub fn concrete(token: impl Into<String>) -> Self {
        Self::new(token, true, false, false)
    }

    /// A byte holding a known symbolic expression
    pub fn symbolic(token: impl Into<String>) -> Self {
        Self::new(token, false, true, false)
    }
}

impl fmt::Display for ByteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Byte-level diff of a plane, grouped by value.
///
/// Within one side, an offset belongs to at most one value. A diff whose
/// deletions side is empty is *additive* and can stand on its own as the
/// full content of a plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteDiff {
    pub additions: BTreeMap<ByteValue, Vec<Offset>>,
    pub deletions: BTreeMap<ByteValue, Vec<Offset>>,
}

impl ByteDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an additive diff from `(value, offsets)` groups
    pub fn from_additions<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (ByteValue, Vec<Offset>)>,
    {
        Self {
            additions: groups.into_iter().collect(),
            deletions: BTreeMap::new(),
        }
    }

    pub fn with_deletions<I>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = (ByteValue, Vec<Offset>)>,
    {
        self.deletions = groups.into_iter().collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    /// True when there is nothing left to subtract
    pub fn is_additive(&self) -> bool {
        self.deletions.values().all(Vec::is_empty)
    }

    /// Compose `self` (applied first) with `later` (applied second).
    ///
    /// The result is a single additive diff relative to the state before
    /// `self`. Deletions in `later` are applied before its additions, so an
    /// offset that `later` both deletes and re-adds ends up re-added.
    /// Deleting an offset that is not present is a no-op.
    pub fn compose(&self, later: &ByteDiff) -> ByteDiff {
        let mut working = self.additions.clone();

        for (value, offsets) in &later.deletions {
            if let Some(current) = working.get_mut(value) {
                let doomed: HashSet<Offset> = offsets.iter().copied().collect();
                current.retain(|offset| !doomed.contains(offset));
            }
        }
        working.retain(|_, offsets| !offsets.is_empty());

        for (value, offsets) in &later.additions {
            match working.get_mut(value) {
                Some(current) => extend_unique(current, offsets.iter().copied()),
                None => {
                    working.insert(value.clone(), offsets.clone());
                }
            }
        }

        ByteDiff {
            additions: working,
            deletions: BTreeMap::new(),
        }
    }

    /// Copy of this diff with the deletions side dropped
    pub fn normalized(&self) -> ByteDiff {
        ByteDiff {
            additions: self.additions.clone(),
            deletions: BTreeMap::new(),
        }
    }

    /// Value recorded at `offset` on the additions side
    pub fn value_at(&self, offset: Offset) -> Option<&ByteValue> {
        self.additions
            .iter()
            .find(|(_, offsets)| offsets.contains(&offset))
            .map(|(value, _)| value)
    }

    /// All offsets on the additions side, ascending and deduplicated
    pub fn offsets(&self) -> Vec<Offset> {
        let mut all: Vec<Offset> = self.additions.values().flatten().copied().collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    /// Offsets claimed by more than one value on the additions side
    pub fn overlapping_offsets(&self) -> Vec<Offset> {
        let mut owners: HashMap<Offset, usize> = HashMap::new();
        for offsets in self.additions.values() {
            let unique: HashSet<&Offset> = offsets.iter().collect();
            for offset in unique {
                *owners.entry(*offset).or_default() += 1;
            }
        }
        let mut shared: Vec<Offset> = owners
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(offset, _)| offset)
            .collect();
        shared.sort_unstable();
        shared
    }
}

/// Append the offsets not already in `current`, keeping first-seen order
pub(crate) fn extend_unique<I>(current: &mut Vec<Offset>, incoming: I)
where
    I: IntoIterator<Item = Offset>,
{
    let mut present: HashSet<Offset> = current.iter().copied().collect();
    for offset in incoming {
        if present.insert(offset) {
            current.push(offset);
        }
    }
}

/// Serialized shape of one byte group
#[derive(Serialize)]
struct ByteGroupView<'a> {
    #[serde(flatten)]
    value: &'a ByteValue,
    offsets: &'a [Offset],
}

fn serialize_side<S>(
    side: &&BTreeMap<ByteValue, Vec<Offset>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(side.len()))?;
    for (value, offsets) in side.iter() {
        seq.serialize_element(&ByteGroupView { value, offsets })?;
    }
    seq.end()
}

impl Serialize for ByteDiff {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct View<'a> {
            #[serde(serialize_with = "serialize_side")]
            add: &'a BTreeMap<ByteValue, Vec<Offset>>,
            #[serde(serialize_with = "serialize_side", skip_serializing_if = "is_empty_side")]
            del: &'a BTreeMap<ByteValue, Vec<Offset>>,
        }

        View {
            add: &self.additions,
            del: &self.deletions,
        }
        .serialize(serializer)
    }
}

fn is_empty_side(side: &&BTreeMap<ByteValue, Vec<Offset>>) -> bool {
    side.is_empty()
}
