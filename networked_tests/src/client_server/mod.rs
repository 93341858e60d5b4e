mod authority;
mod connection;
mod hierarchy;
mod replication;
mod tcp;
