use crate::errors::Result;
use crate::filter::path::PathPattern;

/// Field inclusion/exclusion rules applied to every diff before it is stored
///
/// `omit` runs first, then `pick` keeps only what it names from the
/// remainder. An empty `pick` keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPolicy {
    pub omit: Vec<PathPattern>,
    pub pick: Vec<PathPattern>,
}

impl FieldPolicy {
    /// Build a policy from dotted path strings
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for the first unparseable path.
    pub fn from_paths<O, P>(omit: O, pick: P) -> Result<Self>
    where
        O: IntoIterator,
        O::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Ok(Self {
            omit: parse_all(omit)?,
            pick: parse_all(pick)?,
        })
    }

    /// True when filtering is a no-op
    pub fn is_empty(&self) -> bool {
        self.omit.is_empty() && self.pick.is_empty()
    }
}

fn parse_all<I>(paths: I) -> Result<Vec<PathPattern>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| PathPattern::parse(p.as_ref()))
        .collect()
}
