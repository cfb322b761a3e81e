pub mod oplog;
