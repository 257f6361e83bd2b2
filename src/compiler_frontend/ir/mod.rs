pub mod ir_builder;
pub mod ir_display;
pub mod ir_nodes;
pub mod ir_types;
pub mod text_location;
