pub mod mock_control;
pub mod mock_ws;
