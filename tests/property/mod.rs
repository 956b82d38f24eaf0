pub mod queue_proptest;
