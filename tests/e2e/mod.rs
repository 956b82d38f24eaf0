pub mod offline_flow;
