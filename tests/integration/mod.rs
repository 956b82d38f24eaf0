pub mod queue_durability;
