//! Integration test crate for `lilja_assets`; see `tests/`.
