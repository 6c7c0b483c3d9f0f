//! File-based message channel used once the shared directory is agreed.

pub mod mailbox;

pub use mailbox::{Mailbox, MailboxMessage, MailboxSlot, SlotWatcher, RECEIVE_FILE, SEND_FILE};
