pub mod server_manager;

pub use server_manager::ServerManager;
