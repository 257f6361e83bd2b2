//! Exclusivity checking.
//!
//! Borrow status is rebuilt at every statement from the reference-holding
//! locals that are still live there. Each access then acquires shared or
//! mutable status on its targets, and accesses inside one statement are checked
//! against each other as well.

mod access_tracker;
mod borrow_status;

pub(crate) use access_tracker::StatementAccessTracker;
pub(crate) use borrow_status::BorrowStatus;

use crate::compiler_frontend::analysis::origins::TargetSet;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::LocalId;
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::{borrow_log, ownership_error};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessKind {
    Shared,
    Mutable,
}

impl AccessKind {
    fn as_str(self) -> &'static str {
        match self {
            AccessKind::Shared => "Shared",
            AccessKind::Mutable => "Mutable",
        }
    }
}

/// A live local holding a reference into its targets.
#[derive(Debug, Clone)]
pub(crate) struct Holder {
    pub local: LocalId,
    pub name: String,
    pub targets: TargetSet,
    pub mutable: bool,

    /// Where the held reference was created
    pub sites: Vec<TextLocation>,
}

#[derive(Debug, Clone)]
pub(crate) struct Access<'a> {
    pub targets: &'a TargetSet,
    pub kind: AccessKind,

    /// The reference this access goes through, it does not conflict with itself
    pub via: Option<LocalId>,
    pub location: TextLocation,

    /// Checked against the other accesses of the same statement
    pub in_statement: bool,
}

pub(crate) struct ExclusivityScope {
    holders: Vec<Holder>,
    tracker: StatementAccessTracker,

    /// The local the statement defines, it is not live until the statement ends
    defined: Option<LocalId>,
    pub conflicts_checked: usize,
}

impl ExclusivityScope {
    pub(crate) fn new(target_count: usize, holders: Vec<Holder>, defined: Option<LocalId>) -> Self {
        Self {
            holders,
            tracker: StatementAccessTracker::new(target_count),
            defined,
            conflicts_checked: 0,
        }
    }

    /// Acquire `access` on each of its targets. Returns the first violation found.
    pub(crate) fn check(
        &mut self,
        access: &Access<'_>,
        target_name: &dyn Fn(usize) -> String,
    ) -> Option<CompilerError> {
        let mut violation = None;

        for target_index in access.targets.indices() {
            self.conflicts_checked += 1;

            let (mut status, blocker) = self.status_of(target_index, access.via);

            if let Err(blocking) = status.acquire(access.kind) {
                if violation.is_none() {
                    violation = blocker.map(|holder| {
                        holder_conflict(holder, target_name(target_index), access, blocking)
                    });
                }
            }

            if !access.in_statement {
                continue;
            }

            if let Some(existing) = self.tracker.conflict(target_index, access.kind) {
                if violation.is_none() {
                    let name = target_name(target_index);
                    violation = Some(ownership_error!(
                        ExclusivityViolation,
                        format!(
                            "'{}' is accessed as {} and {} by the same statement",
                            name,
                            existing.as_str(),
                            access.kind.as_str()
                        ),
                        access.location,
                        {
                            BorrowedVariable => name,
                            BorrowKind => access.kind.as_str(),
                            PrimarySuggestion => "Split the overlapping accesses into separate statements",
                        }
                    ));
                }
            }

            self.tracker.record(target_index, access.kind);
        }

        violation
    }

    /// Borrow status of a target from the live holders. The holder the access goes
    /// through and the defined local give their borrow back first.
    fn status_of(&self, target_index: usize, via: Option<LocalId>) -> (BorrowStatus, Option<&Holder>) {
        let mut status = BorrowStatus::Unborrowed;
        let mut blocker: Option<&Holder> = None;

        let holding = self
            .holders
            .iter()
            .filter(|holder| holder.targets.contains(target_index));

        for holder in holding.clone() {
            // Overlapping holders were reported when the second one was created
            if status.acquire(holder_kind(holder)).is_err() {
                status = BorrowStatus::MutablyBorrowed;
            }
        }

        for holder in holding {
            if Some(holder.local) == via || Some(holder.local) == self.defined {
                status.release(holder_kind(holder));
                continue;
            }

            let replaces = match blocker {
                None => true,
                Some(current) => holder.mutable && !current.mutable,
            };
            if replaces {
                blocker = Some(holder);
            }
        }

        if blocker.is_none() {
            status = BorrowStatus::Unborrowed;
        }

        (status, blocker)
    }
}

fn holder_kind(holder: &Holder) -> AccessKind {
    if holder.mutable {
        AccessKind::Mutable
    } else {
        AccessKind::Shared
    }
}

fn holder_conflict(
    holder: &Holder,
    target: String,
    access: &Access<'_>,
    blocking: BorrowStatus,
) -> CompilerError {
    let held = match blocking {
        BorrowStatus::MutablyBorrowed => "mutable",
        BorrowStatus::ImmutablyBorrowed(_) | BorrowStatus::Unborrowed => "shared",
    };

    let verb = match access.kind {
        AccessKind::Shared => "read",
        AccessKind::Mutable => "mutate or move",
    };

    borrow_log!(format!(
        "[Exclusivity] {} access to '{}' blocked by '{}'",
        access.kind.as_str(),
        target,
        holder.name
    ));

    let mut error = ownership_error!(
        ExclusivityViolation,
        format!(
            "Cannot {} '{}' while '{}' holds a {} borrow of it",
            verb, target, holder.name, held
        ),
        access.location,
        {
            BorrowedVariable => target.as_str(),
            ConflictingVariable => holder.name.as_str(),
            BorrowKind => access.kind.as_str(),
            PrimarySuggestion => "Finish using the other reference before this access",
        }
    );

    for site in &holder.sites {
        error = error.with_related(*site, format!("'{}' borrows '{}' here", holder.name, target));
    }

    error
}
