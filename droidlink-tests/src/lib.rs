//! End-to-end tests of the droidlink client against simulated devices,
//! see `tests/`.
