pub mod invite;

pub use invite::{InviteMailer, MailError};
