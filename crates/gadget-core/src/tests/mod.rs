//! Facade-level integration scenarios, exercised through the public API
//! only.
