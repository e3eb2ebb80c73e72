//! Pagination cursors.
//!
//! A cursor is the ordering key of the last item on the previous page, never
//! an offset, so inserts between requests do not shift pages.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::model::{Path, PostId};

/// Boundary of a page.
///
/// Which variant is meaningful depends on the sort mode: flat and
/// parent_tree page by post id, tree pages by path (a post id is accepted
/// there too and stands for that post's path).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    Post(PostId),
    Path(Path),
}

impl Cursor {
    /// A zero post id means "from the start".
    pub fn is_start(&self) -> bool {
        match self {
            Cursor::Post(id) => *id == 0,
            Cursor::Path(path) => path.is_empty(),
        }
    }
}

impl FromStr for Cursor {
    type Err = Error;

    /// `"42"` is a post id, `"1.4.9"` a path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Error::MalformedCursor(s.to_owned());
        let s = s.trim();
        if s.is_empty() {
            return Err(malformed());
        }
        if !s.contains('.') {
            return s.parse().map(Cursor::Post).map_err(|_| malformed());
        }
        let ids = s
            .split('.')
            .map(|part| part.parse::<PostId>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Cursor::Path(Path::from(ids)))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Post(id) => write!(f, "{id}"),
            Cursor::Path(path) => write!(f, "{path}"),
        }
    }
}

impl From<PostId> for Cursor {
    fn from(id: PostId) -> Self {
        Cursor::Post(id)
    }
}

impl From<Path> for Cursor {
    fn from(path: Path) -> Self {
        Cursor::Path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_post_id() {
        assert_eq!("42".parse::<Cursor>().unwrap(), Cursor::Post(42));
    }

    #[test]
    fn test_parse_path() {
        let cursor: Cursor = "1.4.9".parse().unwrap();
        assert_eq!(cursor, Cursor::Path(Path::from(vec![1, 4, 9])));
        assert_eq!(cursor.to_string(), "1.4.9");
    }

    #[test]
    fn test_malformed() {
        for input in ["", "abc", "1..2", "1.x", "."] {
            let err = input.parse::<Cursor>().unwrap_err();
            assert!(matches!(err, Error::MalformedCursor(_)), "{input}: {err}");
        }
    }

    #[test]
    fn test_zero_is_start() {
        assert!(Cursor::Post(0).is_start());
        assert!(!Cursor::Post(3).is_start());
    }
}
