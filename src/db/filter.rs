use bson::{doc, Document};

use crate::db::models::Record;

/// Which records a query may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// No visibility restriction.
    Anyone,
    /// Records that are visible, or carry no `visible` flag at all.
    Public,
    /// Records where the user is owner, editor or viewer, regardless of `visible`.
    Member(String),
    /// Union of `Public` and `Member`.
    PublicOrMember(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleMatch {
    /// Case-sensitive literal substring.
    Contains(String),
    Exact(String),
}

/// A store-independent predicate over records.
///
/// The same filter is rendered as a MongoDB query by [`RecordFilter::to_document`]
/// and evaluated in process by [`RecordFilter::matches`]; both must agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub audience: Audience,
    pub title: Option<TitleMatch>,
}

impl RecordFilter {
    pub fn new(audience: Audience) -> Self {
        Self {
            audience,
            title: None,
        }
    }

    /// Visibility for an optional caller, as used by the public listing.
    pub fn visible_to(caller: Option<&str>) -> Self {
        match caller {
            Some(username) => Self::new(Audience::PublicOrMember(username.to_string())),
            None => Self::new(Audience::Public),
        }
    }

    pub fn member(username: &str) -> Self {
        Self::new(Audience::Member(username.to_string()))
    }

    pub fn title_exact(title: &str) -> Self {
        Self {
            audience: Audience::Anyone,
            title: Some(TitleMatch::Exact(title.to_string())),
        }
    }

    /// Conjoin a substring title filter. Empty strings are ignored.
    pub fn title_contains(mut self, needle: Option<&str>) -> Self {
        self.title = needle
            .filter(|n| !n.is_empty())
            .map(|n| TitleMatch::Contains(n.to_string()));
        self
    }

    pub fn to_document(&self) -> Document {
        let public = || vec![doc! { "visible": true }, doc! { "visible": { "$exists": false } }];
        let member = |u: &str| {
            vec![
                doc! { "owner": u },
                doc! { "editors": u },
                doc! { "viewers": u },
            ]
        };

        let mut filter = match &self.audience {
            Audience::Anyone => Document::new(),
            Audience::Public => doc! { "$or": public() },
            Audience::Member(u) => doc! { "$or": member(u) },
            Audience::PublicOrMember(u) => {
                let mut clauses = member(u);
                clauses.extend(public());
                doc! { "$or": clauses }
            }
        };

        match &self.title {
            Some(TitleMatch::Contains(needle)) => {
                filter.insert("title", doc! { "$regex": regex::escape(needle) });
            }
            Some(TitleMatch::Exact(title)) => {
                filter.insert("title", title.as_str());
            }
            None => {}
        }

        filter
    }

    pub fn matches(&self, record: &Record) -> bool {
        let audience_ok = match &self.audience {
            Audience::Anyone => true,
            Audience::Public => record.is_public(),
            Audience::Member(u) => record.is_member(u),
            Audience::PublicOrMember(u) => record.is_public() || record.is_member(u),
        };

        let title_ok = match &self.title {
            Some(TitleMatch::Contains(needle)) => record.title.contains(needle.as_str()),
            Some(TitleMatch::Exact(title)) => record.title == *title,
            None => true,
        };

        audience_ok && title_ok
    }
}
