//! The six measured operations and the `--operation` selector.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// Name of the selector that runs every operation.
pub const ALL: &str = "all";

/// One measured action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "&'static str")]
pub enum Operation {
    Insert,
    InsertBulk,
    Update,
    Delete,
    FindOne,
    FindPaginating,
}

impl Operation {
    /// Every operation, in report order.
    pub const ALL: [Operation; 6] = [
        Operation::Insert,
        Operation::InsertBulk,
        Operation::Update,
        Operation::Delete,
        Operation::FindOne,
        Operation::FindPaginating,
    ];

    /// Command-line name of the operation.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::InsertBulk => "insert-bulk",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::FindOne => "select-one",
            Operation::FindPaginating => "select-paginating",
        }
    }
}

impl From<Operation> for &'static str {
    fn from(op: Operation) -> Self {
        op.name()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = Operation::ALL.iter().map(|op| op.name()).collect();
                Error::Config(format!(
                    "unknown operation '{}', expected '{}' or one of: {}",
                    s,
                    ALL,
                    valid.join(", ")
                ))
            })
    }
}

/// Which operations a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationSelector {
    All,
    One(Operation),
}

impl OperationSelector {
    /// The selected operations, in report order.
    pub fn operations(&self) -> Vec<Operation> {
        match self {
            OperationSelector::All => Operation::ALL.to_vec(),
            OperationSelector::One(op) => vec![*op],
        }
    }
}

impl Default for OperationSelector {
    fn default() -> Self {
        OperationSelector::One(Operation::FindOne)
    }
}

impl fmt::Display for OperationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationSelector::All => f.write_str(ALL),
            OperationSelector::One(op) => op.fmt(f),
        }
    }
}

impl FromStr for OperationSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ALL {
            Ok(OperationSelector::All)
        } else {
            s.parse().map(OperationSelector::One)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_selector_all() {
        let selector: OperationSelector = "all".parse().unwrap();
        assert_eq!(selector, OperationSelector::All);
        assert_eq!(selector.operations().len(), 6);
        assert_eq!(selector.operations()[0], Operation::Insert);
    }

    #[test]
    fn test_selector_single() {
        let selector: OperationSelector = "insert-bulk".parse().unwrap();
        assert_eq!(selector, OperationSelector::One(Operation::InsertBulk));
        assert_eq!(selector.operations(), vec![Operation::InsertBulk]);
    }

    #[test]
    fn test_bogus_operation_is_config_error() {
        let err = "bogus-op".parse::<OperationSelector>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("bogus-op"));
    }

    #[test]
    fn test_default_is_select_one() {
        assert_eq!(
            OperationSelector::default(),
            OperationSelector::One(Operation::FindOne)
        );
        assert_eq!(OperationSelector::default().to_string(), "select-one");
    }

    #[test]
    fn test_serializes_as_name() {
        let json = serde_json::to_string(&Operation::FindPaginating).unwrap();
        assert_eq!(json, "\"select-paginating\"");
    }
}
