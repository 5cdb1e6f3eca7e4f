mod bitbake;
mod git;
mod mail;

pub use bitbake::Bitbake;
pub use git::GitTree;
pub use mail::Sendmail;
