pub mod backed_up_file;
pub mod backup_instance;
