use mockall::automock;

use crate::domain::value_objects::notices::UserNotice;

/// Outbound user notices. Publishing never fails from the caller's point of
/// view; delivery problems are the publisher's to log.
#[automock]
pub trait NoticePublisher: Send + Sync {
    fn publish(&self, notice: UserNotice);
}
