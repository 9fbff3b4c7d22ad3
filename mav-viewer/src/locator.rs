//! Entity references and route parsing
//!
//! A QR code lands on a route carrying up to four ordered ids:
//! `bookId | workbookId, chapterId?, topicId?, subtopicId?`. The locator turns
//! them into an [`EntityRef`] before any network access happens.
//!
//! The entity kind is chosen by the deepest id present. This is strict
//! precedence, not a fallback: a deeper id whose ancestor is missing is an
//! orphan and the whole reference is rejected.

use crate::error::{ViewerError, ViewerResult};
use serde::Serialize;
use std::fmt;
use urlencoding::encode;

/// Node kind in the content hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Book,
    Chapter,
    Topic,
    Subtopic,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Book => "book",
            EntityKind::Chapter => "chapter",
            EntityKind::Topic => "topic",
            EntityKind::Subtopic => "subtopic",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated pointer to one node of the content hierarchy
///
/// Each variant carries every ancestor id needed to build its path. Values
/// can only be built through the checked constructors, so an incomplete
/// reference never reaches the network layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityRef {
    Book {
        book_id: String,
    },
    Chapter {
        book_id: String,
        chapter_id: String,
    },
    Topic {
        book_id: String,
        chapter_id: String,
        topic_id: String,
    },
    Subtopic {
        book_id: String,
        chapter_id: String,
        topic_id: String,
        subtopic_id: String,
    },
}

fn require(name: &str, value: &str) -> ViewerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ViewerError::InvalidReference(format!("{} is empty", name)));
    }
    Ok(trimmed.to_string())
}

impl EntityRef {
    pub fn book(book_id: &str) -> ViewerResult<Self> {
        Ok(EntityRef::Book {
            book_id: require("bookId", book_id)?,
        })
    }

    pub fn chapter(book_id: &str, chapter_id: &str) -> ViewerResult<Self> {
        Ok(EntityRef::Chapter {
            book_id: require("bookId", book_id)?,
            chapter_id: require("chapterId", chapter_id)?,
        })
    }

    pub fn topic(book_id: &str, chapter_id: &str, topic_id: &str) -> ViewerResult<Self> {
        Ok(EntityRef::Topic {
            book_id: require("bookId", book_id)?,
            chapter_id: require("chapterId", chapter_id)?,
            topic_id: require("topicId", topic_id)?,
        })
    }

    pub fn subtopic(
        book_id: &str,
        chapter_id: &str,
        topic_id: &str,
        subtopic_id: &str,
    ) -> ViewerResult<Self> {
        Ok(EntityRef::Subtopic {
            book_id: require("bookId", book_id)?,
            chapter_id: require("chapterId", chapter_id)?,
            topic_id: require("topicId", topic_id)?,
            subtopic_id: require("subtopicId", subtopic_id)?,
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Book { .. } => EntityKind::Book,
            EntityRef::Chapter { .. } => EntityKind::Chapter,
            EntityRef::Topic { .. } => EntityKind::Topic,
            EntityRef::Subtopic { .. } => EntityKind::Subtopic,
        }
    }

    pub fn book_id(&self) -> &str {
        match self {
            EntityRef::Book { book_id }
            | EntityRef::Chapter { book_id, .. }
            | EntityRef::Topic { book_id, .. }
            | EntityRef::Subtopic { book_id, .. } => book_id,
        }
    }

    /// Id of the node itself (the deepest id)
    pub fn leaf_id(&self) -> &str {
        match self {
            EntityRef::Book { book_id } => book_id,
            EntityRef::Chapter { chapter_id, .. } => chapter_id,
            EntityRef::Topic { topic_id, .. } => topic_id,
            EntityRef::Subtopic { subtopic_id, .. } => subtopic_id,
        }
    }

    /// Aggregation endpoint path; each id is percent-encoded as one segment
    pub fn resource_path(&self) -> String {
        match self {
            EntityRef::Book { book_id } => format!("/book-data/{}", encode(book_id)),
            EntityRef::Chapter {
                book_id,
                chapter_id,
            } => format!(
                "/book-data/{}/chapters/{}",
                encode(book_id),
                encode(chapter_id)
            ),
            EntityRef::Topic {
                book_id,
                chapter_id,
                topic_id,
            } => format!(
                "/book-data/{}/chapters/{}/topics/{}",
                encode(book_id),
                encode(chapter_id),
                encode(topic_id)
            ),
            EntityRef::Subtopic {
                book_id,
                chapter_id,
                topic_id,
                subtopic_id,
            } => format!(
                "/book-data/{}/chapters/{}/topics/{}/subtopics/{}",
                encode(book_id),
                encode(chapter_id),
                encode(topic_id),
                encode(subtopic_id)
            ),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.resource_path())
    }
}

/// Raw route parameters as handed over by the router
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    /// bookId or workbookId
    pub book_id: Option<String>,
    pub chapter_id: Option<String>,
    pub topic_id: Option<String>,
    pub subtopic_id: Option<String>,
    pub is_workbook: bool,
}

impl RouteParams {
    /// Build params from ordered path segments
    ///
    /// More than four segments cannot be mapped to the hierarchy.
    pub fn from_segments(segments: &[&str], is_workbook: bool) -> ViewerResult<Self> {
        if segments.len() > 4 {
            return Err(ViewerError::InvalidReference(format!(
                "expected at most 4 path segments, got {}",
                segments.len()
            )));
        }

        let at = |i: usize| segments.get(i).map(|s| s.to_string());
        Ok(Self {
            book_id: at(0),
            chapter_id: at(1),
            topic_id: at(2),
            subtopic_id: at(3),
            is_workbook,
        })
    }
}

/// Result of locating a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedEntity {
    pub entity: EntityRef,
    pub is_workbook: bool,
}

/// Route → entity resolution
pub struct EntityLocator;

impl EntityLocator {
    /// Locate the entity named by `params`
    ///
    /// Pure function of its input. Empty or whitespace ids count as absent.
    pub fn locate(params: &RouteParams) -> ViewerResult<LocatedEntity> {
        let present = |value: &Option<String>| -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ids = [
            present(&params.book_id),
            present(&params.chapter_id),
            present(&params.topic_id),
            present(&params.subtopic_id),
        ];
        const NAMES: [&str; 4] = ["bookId", "chapterId", "topicId", "subtopicId"];

        // Deepest present id decides the kind; every shallower id must exist.
        let depth = match ids.iter().rposition(Option::is_some) {
            Some(deepest) => deepest,
            None => {
                return Err(ViewerError::InvalidReference(format!(
                    "missing {}",
                    if params.is_workbook { "workbookId" } else { "bookId" }
                )))
            }
        };

        if let Some(gap) = ids[..depth].iter().position(Option::is_none) {
            return Err(ViewerError::InvalidReference(format!(
                "{} given without {}",
                NAMES[depth], NAMES[gap]
            )));
        }

        let id = |i: usize| ids[i].as_deref().unwrap_or_default();
        let entity = match depth {
            0 => EntityRef::book(id(0))?,
            1 => EntityRef::chapter(id(0), id(1))?,
            2 => EntityRef::topic(id(0), id(1), id(2))?,
            _ => EntityRef::subtopic(id(0), id(1), id(2), id(3))?,
        };

        tracing::debug!(
            kind = %entity.kind(),
            path = %entity.resource_path(),
            is_workbook = params.is_workbook,
            "Located entity"
        );

        Ok(LocatedEntity {
            entity,
            is_workbook: params.is_workbook,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(ids: [Option<&str>; 4]) -> RouteParams {
        RouteParams {
            book_id: ids[0].map(str::to_string),
            chapter_id: ids[1].map(str::to_string),
            topic_id: ids[2].map(str::to_string),
            subtopic_id: ids[3].map(str::to_string),
            is_workbook: false,
        }
    }

    #[test]
    fn test_every_gap_free_combination_has_one_kind() {
        let cases = [
            (1, EntityKind::Book),
            (2, EntityKind::Chapter),
            (3, EntityKind::Topic),
            (4, EntityKind::Subtopic),
        ];
        let all = ["b1", "c1", "t1", "s1"];

        for (len, kind) in cases {
            let located = EntityLocator::locate(
                &RouteParams::from_segments(&all[..len], false).unwrap(),
            )
            .unwrap();
            assert_eq!(located.entity.kind(), kind, "{} segments", len);
        }
    }

    #[test]
    fn test_every_gapped_combination_is_invalid() {
        // All 16 presence masks; a mask is valid iff it is a prefix 1..=4.
        for mask in 0u8..16 {
            let slot = |bit: u8, id: &'static str| (mask & (1 << bit) != 0).then_some(id);
            let p = params([
                slot(0, "b1"),
                slot(1, "c1"),
                slot(2, "t1"),
                slot(3, "s1"),
            ]);
            let is_prefix = matches!(mask, 0b0001 | 0b0011 | 0b0111 | 0b1111);

            let result = EntityLocator::locate(&p);
            assert_eq!(result.is_ok(), is_prefix, "mask {:04b}", mask);
            if let Err(err) = result {
                assert!(matches!(err, ViewerError::InvalidReference(_)));
            }
        }
    }

    #[test]
    fn test_orphaned_subtopic_is_not_downgraded() {
        let err = EntityLocator::locate(&params([Some("b1"), Some("c1"), None, Some("s1")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid reference: subtopicId given without topicId"
        );
    }

    #[test]
    fn test_whitespace_counts_as_absent() {
        let err =
            EntityLocator::locate(&params([Some("b1"), Some("  "), Some("t1"), None])).unwrap_err();
        assert!(matches!(err, ViewerError::InvalidReference(_)));
    }

    #[test]
    fn test_too_many_segments() {
        assert!(RouteParams::from_segments(&["a", "b", "c", "d", "e"], false).is_err());
    }

    #[test]
    fn test_workbook_flag_is_carried() {
        let located =
            EntityLocator::locate(&RouteParams::from_segments(&["w1"], true).unwrap()).unwrap();
        assert!(located.is_workbook);
        assert_eq!(located.entity, EntityRef::book("w1").unwrap());
    }

    #[test]
    fn test_missing_workbook_message() {
        let err = EntityLocator::locate(&RouteParams {
            is_workbook: true,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid reference: missing workbookId");
    }

    #[test]
    fn test_resource_paths() {
        assert_eq!(EntityRef::book("b1").unwrap().resource_path(), "/book-data/b1");
        assert_eq!(
            EntityRef::topic("b1", "c1", "t1").unwrap().resource_path(),
            "/book-data/b1/chapters/c1/topics/t1"
        );
        assert_eq!(
            EntityRef::subtopic("b1", "c1", "t1", "s1")
                .unwrap()
                .resource_path(),
            "/book-data/b1/chapters/c1/topics/t1/subtopics/s1"
        );
    }

    #[test]
    fn test_resource_path_encodes_ids() {
        let entity = EntityRef::topic("b1", "c/1", "t?x#y").unwrap();
        assert_eq!(
            entity.resource_path(),
            "/book-data/b1/chapters/c%2F1/topics/t%3Fx%23y"
        );
    }

    #[test]
    fn test_constructor_rejects_empty_ancestor() {
        assert!(EntityRef::chapter("", "c1").is_err());
        assert!(EntityRef::topic("b1", "c1", " ").is_err());
    }

    #[test]
    fn test_ids_are_trimmed() {
        let entity = EntityRef::chapter(" b1 ", "c1\n").unwrap();
        assert_eq!(entity.book_id(), "b1");
        assert_eq!(entity.leaf_id(), "c1");
    }
}
