use std::collections::BTreeMap;

use crate::exif::{Exif, TagField};

/// Kinds of metadata a container can carry. Each appears at most once in
/// a `MetadataMap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    Comment,
    Xmp,
    Exif,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Metadata {
    Comments(Comments),
    /// raw XMP packet bytes
    Xmp(Vec<u8>),
    Exif(Exif),
}

pub type MetadataMap = BTreeMap<MetadataKind, Metadata>;

/// All comment records of a stream, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comments {
    comments: Vec<Vec<u8>>,
}

impl Comments {
    pub fn push(&mut self, comment: Vec<u8>) {
        self.comments.push(comment);
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.comments.iter().map(|c| &c[..])
    }

    /// comments decoded as (lossy) utf-8
    pub fn texts(&self) -> Vec<String> {
        self.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect()
    }
}

/// An edit requested from `rewrite`.
#[derive(Clone, Debug)]
pub enum Operation {
    InsertComments(Vec<String>),
    /// `None` strips the existing packet
    InsertOrReplaceXmp(Option<Vec<u8>>),
    /// converted to the container's byte order when it was built in the other one
    InsertOrUpdateField(TagField),
}

impl Operation {
    pub(crate) fn name(&self) -> &'static str {
        match *self {
            Operation::InsertComments(_) => "inserting comments",
            Operation::InsertOrReplaceXmp(_) => "replacing xmp",
            Operation::InsertOrUpdateField(_) => "updating tag fields",
        }
    }
}
