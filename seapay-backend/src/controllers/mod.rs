pub mod chatkit;
pub mod health;
pub mod threads;

#[cfg(test)]
pub(crate) use test_support::test_state;
