pub mod controls;
pub mod grid_view;
pub mod map_view;
