pub mod handler;
pub mod msg_comment_handler;
pub mod msg_edit_handler;
pub mod msg_join_handler;
pub mod msg_signal_handler;
