// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// What is wrong with a single field or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    FormatMismatch,
    TypeIdMismatch,
    SubtypeIdMismatch,
    ChecksumError,
    ExpectedZero,
    FixedValueMismatch,
    MissingSelfRef,
    RefMissing,
    RefOutOfRange,
    RefTypeMismatch,
    UnexpectedRef,
    HashBucketMismatch,
    ValueOutOfRange,
    AllocatedButEmpty,
    FreeButOccupied,
    Unreferenced,
    MultiplyReferenced,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FormatMismatch => "format-mismatch",
            ErrorKind::TypeIdMismatch => "type-id-mismatch",
            ErrorKind::SubtypeIdMismatch => "subtype-id-mismatch",
            ErrorKind::ChecksumError => "checksum-error",
            ErrorKind::ExpectedZero => "expected-zero",
            ErrorKind::FixedValueMismatch => "fixed-value-mismatch",
            ErrorKind::MissingSelfRef => "missing-self-ref",
            ErrorKind::RefMissing => "ref-missing",
            ErrorKind::RefOutOfRange => "ref-out-of-range",
            ErrorKind::RefTypeMismatch => "ref-type-mismatch",
            ErrorKind::UnexpectedRef => "unexpected-ref",
            ErrorKind::HashBucketMismatch => "hash-bucket-mismatch",
            ErrorKind::ValueOutOfRange => "value-out-of-range",
            ErrorKind::AllocatedButEmpty => "allocated-but-empty",
            ErrorKind::FreeButOccupied => "free-but-occupied",
            ErrorKind::Unreferenced => "unreferenced",
            ErrorKind::MultiplyReferenced => "multiply-referenced",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub block: u32,
    pub offset: usize,
    pub kind: ErrorKind,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} [{}.{}]: {}",
            self.block,
            self.offset / 4,
            self.offset % 4,
            self.kind
        )
    }
}

/// Result of a whole-volume consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub corrupted_blocks: usize,
    pub issues: Vec<Issue>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: u32, offset: usize, kind: ErrorKind) {
        self.issues.push(Issue {
            block,
            offset,
            kind,
        });
    }

    /// Orders the issues by block and offset and recounts the corrupted
    /// blocks.
    pub fn finish(mut self) -> Self {
        self.issues.sort_by_key(|i| (i.block, i.offset));
        self.corrupted_blocks = self
            .issues
            .iter()
            .map(|i| i.block)
            .collect::<BTreeSet<_>>()
            .len();
        self
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for(&self, block: u32) -> impl Iterator<Item = &Issue> + '_ {
        self.issues.iter().filter(move |i| i.block == block)
    }

    /// Block numbers with at least one issue, in ascending order.
    pub fn corrupted_block_numbers(&self) -> Vec<u32> {
        let mut blocks: Vec<u32> = self.issues.iter().map(|i| i.block).collect();
        blocks.sort_unstable();
        blocks.dedup();
        blocks
    }

    /// Number of issues found in `block`.
    pub fn corrupted(&self, block: u32) -> usize {
        self.issues_for(block).count()
    }

    pub fn is_corrupted(&self, block: u32) -> bool {
        self.issues.iter().any(|i| i.block == block)
    }

    /// Position of `block` among the corrupted blocks, counting from 1.
    pub fn corrupted_index(&self, block: u32) -> Option<usize> {
        self.corrupted_block_numbers()
            .iter()
            .position(|&b| b == block)
            .map(|p| p + 1)
    }

    /// The `n`th corrupted block, counting from 1.
    pub fn nth_corrupted(&self, n: usize) -> Option<u32> {
        n.checked_sub(1)
            .and_then(|i| self.corrupted_block_numbers().get(i).copied())
    }

    /// The closest corrupted block after `block`, or `block` itself if
    /// there is none.
    pub fn next_corrupted(&self, block: u32) -> u32 {
        self.issues
            .iter()
            .map(|i| i.block)
            .filter(|&b| b > block)
            .min()
            .unwrap_or(block)
    }

    /// The closest corrupted block before `block`, or `block` itself if
    /// there is none.
    pub fn prev_corrupted(&self, block: u32) -> u32 {
        self.issues
            .iter()
            .map(|i| i.block)
            .filter(|&b| b < block)
            .max()
            .unwrap_or(block)
    }

    /// The first issue located after (`block`, `offset`).
    pub fn next_issue(&self, block: u32, offset: usize) -> Option<&Issue> {
        self.issues
            .iter()
            .filter(|i| (i.block, i.offset) > (block, offset))
            .min_by_key(|i| (i.block, i.offset))
    }

    /// The last issue located before (`block`, `offset`).
    pub fn prev_issue(&self, block: u32, offset: usize) -> Option<&Issue> {
        self.issues
            .iter()
            .filter(|i| (i.block, i.offset) < (block, offset))
            .max_by_key(|i| (i.block, i.offset))
    }

    pub fn first_error_block(&self) -> Option<u32> {
        self.issues.first().map(|i| i.block)
    }

    pub fn last_error_block(&self) -> Option<u32> {
        self.issues.last().map(|i| i.block)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{}", issue)?;
        }
        write!(
            f,
            "{} issue(s) in {} corrupted block(s)",
            self.issues.len(),
            self.corrupted_blocks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_is_sorted_and_counted() {
        let mut report = Report::new();
        report.push(9, 20, ErrorKind::ChecksumError);
        report.push(7, 0, ErrorKind::AllocatedButEmpty);
        report.push(9, 0, ErrorKind::TypeIdMismatch);
        let report = report.finish();

        assert_eq!(report.corrupted_blocks, 2);
        assert_eq!(report.first_error_block(), Some(7));
        assert_eq!(report.last_error_block(), Some(9));
        assert_eq!(report.issues[1].kind, ErrorKind::TypeIdMismatch);
        assert_eq!(report.issues_for(9).count(), 2);
    }

    fn sample() -> Report {
        let mut report = Report::new();
        report.push(40, 0, ErrorKind::AllocatedButEmpty);
        report.push(7, 20, ErrorKind::ChecksumError);
        report.push(7, 4, ErrorKind::MissingSelfRef);
        report.push(900, 24, ErrorKind::HashBucketMismatch);
        report.finish()
    }

    #[test]
    fn test_walk_corrupted_block_numbers() {
        let report = sample();
        assert_eq!(report.corrupted_block_numbers(), vec![7, 40, 900]);
        assert_eq!(report.corrupted(7), 2);
        assert_eq!(report.corrupted(8), 0);
        assert!(report.is_corrupted(40));
        assert!(!report.is_corrupted(41));

        assert_eq!(report.next_corrupted(0), 7);
        assert_eq!(report.next_corrupted(7), 40);
        assert_eq!(report.next_corrupted(41), 900);
        assert_eq!(report.next_corrupted(900), 900);
        assert_eq!(report.prev_corrupted(900), 40);
        assert_eq!(report.prev_corrupted(40), 7);
        assert_eq!(report.prev_corrupted(7), 7);
        assert_eq!(report.prev_corrupted(3), 3);

        assert_eq!(report.nth_corrupted(1), Some(7));
        assert_eq!(report.nth_corrupted(3), Some(900));
        assert_eq!(report.nth_corrupted(0), None);
        assert_eq!(report.nth_corrupted(4), None);
        assert_eq!(report.corrupted_index(40), Some(2));
        assert_eq!(report.corrupted_index(41), None);
    }

    #[test]
    fn test_walk_issue_locations() {
        let report = sample();
        let at = |i: Option<&Issue>| i.map(|i| (i.block, i.offset));

        assert_eq!(at(report.next_issue(0, 0)), Some((7, 4)));
        assert_eq!(at(report.next_issue(7, 4)), Some((7, 20)));
        assert_eq!(at(report.next_issue(7, 20)), Some((40, 0)));
        assert_eq!(at(report.next_issue(900, 24)), None);

        assert_eq!(at(report.prev_issue(900, 24)), Some((40, 0)));
        assert_eq!(at(report.prev_issue(40, 0)), Some((7, 20)));
        assert_eq!(at(report.prev_issue(7, 4)), None);
        assert_eq!(at(report.prev_issue(u32::MAX, 0)), Some((900, 24)));

        let clean = Report::new().finish();
        assert_eq!(clean.next_corrupted(5), 5);
        assert!(clean.next_issue(0, 0).is_none());
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::AllocatedButEmpty).unwrap();
        assert_eq!(json, "\"allocated-but-empty\"");
        assert_eq!(ErrorKind::FreeButOccupied.to_string(), "free-but-occupied");
    }
}
