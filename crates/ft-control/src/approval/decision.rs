//! Operator decision grammar
//!
//! `y` approves everything, `n` denies everything, `y 1,3` approves only
//! the listed items and `n 2` approves everything except the listed items.
//! Indices are 1-based. Anything that does not parse is a deny.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    ApproveAll,
    DenyAll,
    ApproveOnly(BTreeSet<usize>),
    ApproveAllExcept(BTreeSet<usize>),
}

impl Decision {
    /// Parse operator input against `count` numbered items
    pub fn parse(input: &str, count: usize) -> Self {
        let input = input.trim().to_ascii_lowercase();
        let (head, rest) = match input.find(|c: char| c.is_whitespace()) {
            Some(pos) => (&input[..pos], input[pos..].trim()),
            None => (input.as_str(), ""),
        };

        let approve = match head {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => return Decision::DenyAll,
        };
        if rest.is_empty() {
            return if approve {
                Decision::ApproveAll
            } else {
                Decision::DenyAll
            };
        }

        let Some(indices) = parse_indices(rest, count) else {
            return Decision::DenyAll;
        };
        if approve {
            Decision::ApproveOnly(indices)
        } else {
            Decision::ApproveAllExcept(indices)
        }
    }

    /// Whether the 1-based item `index` is approved
    pub fn approves(&self, index: usize) -> bool {
        match self {
            Decision::ApproveAll => true,
            Decision::DenyAll => false,
            Decision::ApproveOnly(set) => set.contains(&index),
            Decision::ApproveAllExcept(set) => !set.contains(&index),
        }
    }
}

fn parse_indices(text: &str, count: usize) -> Option<BTreeSet<usize>> {
    let mut indices = BTreeSet::new();
    for token in text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let index: usize = token.parse().ok()?;
        if index == 0 || index > count {
            return None;
        }
        indices.insert(index);
    }
    if indices.is_empty() {
        None
    } else {
        Some(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_parse_plain_answers() {
        assert_eq!(Decision::parse("y", 3), Decision::ApproveAll);
        assert_eq!(Decision::parse(" YES ", 3), Decision::ApproveAll);
        assert_eq!(Decision::parse("n", 3), Decision::DenyAll);
        assert_eq!(Decision::parse("", 3), Decision::DenyAll);
        assert_eq!(Decision::parse("maybe", 3), Decision::DenyAll);
    }

    #[test]
    fn test_parse_indices() {
        assert_eq!(Decision::parse("y 1,3", 3), Decision::ApproveOnly(set(&[1, 3])));
        assert_eq!(Decision::parse("y 1 3", 3), Decision::ApproveOnly(set(&[1, 3])));
        assert_eq!(Decision::parse("n 2", 3), Decision::ApproveAllExcept(set(&[2])));
    }

    #[test]
    fn test_parse_bad_indices_denies() {
        assert_eq!(Decision::parse("y 0", 3), Decision::DenyAll);
        assert_eq!(Decision::parse("y 4", 3), Decision::DenyAll);
        assert_eq!(Decision::parse("y one", 3), Decision::DenyAll);
        assert_eq!(Decision::parse("n 1,x", 3), Decision::DenyAll);
    }

    #[test]
    fn test_approves() {
        let only = Decision::parse("y 2", 3);
        assert!(!only.approves(1));
        assert!(only.approves(2));

        let except = Decision::parse("n 2", 3);
        assert!(except.approves(1));
        assert!(!except.approves(2));
        assert!(except.approves(3));
    }
}
