mod common;
mod diff;
mod notify;
