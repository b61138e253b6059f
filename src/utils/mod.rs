pub mod drop_guard;
