use crate::compiler_frontend::analysis::exclusivity::AccessKind;

/// Borrow state of one target while a statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BorrowStatus {
    #[default]
    Unborrowed,
    ImmutablyBorrowed(u32),
    MutablyBorrowed,
}

impl BorrowStatus {
    /// Take a new borrow. On failure the status is unchanged and the blocking state is returned.
    pub(crate) fn acquire(&mut self, kind: AccessKind) -> Result<(), BorrowStatus> {
        match (*self, kind) {
            (BorrowStatus::Unborrowed, AccessKind::Shared) => {
                *self = BorrowStatus::ImmutablyBorrowed(1);
                Ok(())
            }
            (BorrowStatus::ImmutablyBorrowed(count), AccessKind::Shared) => {
                *self = BorrowStatus::ImmutablyBorrowed(count + 1);
                Ok(())
            }
            (BorrowStatus::Unborrowed, AccessKind::Mutable) => {
                *self = BorrowStatus::MutablyBorrowed;
                Ok(())
            }
            (blocking, _) => Err(blocking),
        }
    }

    /// Give back one borrow of the given kind, at its last use.
    pub(crate) fn release(&mut self, kind: AccessKind) {
        *self = match (*self, kind) {
            (BorrowStatus::ImmutablyBorrowed(count), AccessKind::Shared) if count > 1 => {
                BorrowStatus::ImmutablyBorrowed(count - 1)
            }
            (BorrowStatus::ImmutablyBorrowed(_), AccessKind::Shared)
            | (BorrowStatus::MutablyBorrowed, AccessKind::Mutable) => BorrowStatus::Unborrowed,
            (unchanged, _) => unchanged,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_borrows_stack_and_release_back_to_unborrowed() {
        let mut status = BorrowStatus::default();

        assert!(status.acquire(AccessKind::Shared).is_ok());
        assert!(status.acquire(AccessKind::Shared).is_ok());
        assert_eq!(status, BorrowStatus::ImmutablyBorrowed(2));
        assert_eq!(
            status.acquire(AccessKind::Mutable),
            Err(BorrowStatus::ImmutablyBorrowed(2))
        );

        status.release(AccessKind::Shared);
        status.release(AccessKind::Shared);
        assert_eq!(status, BorrowStatus::Unborrowed);
    }

    #[test]
    fn mutable_borrow_is_exclusive() {
        let mut status = BorrowStatus::default();

        assert!(status.acquire(AccessKind::Mutable).is_ok());
        assert_eq!(
            status.acquire(AccessKind::Shared),
            Err(BorrowStatus::MutablyBorrowed)
        );
        assert_eq!(
            status.acquire(AccessKind::Mutable),
            Err(BorrowStatus::MutablyBorrowed)
        );

        status.release(AccessKind::Mutable);
        assert!(status.acquire(AccessKind::Mutable).is_ok());
    }
}
