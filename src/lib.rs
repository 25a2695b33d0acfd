pub mod archive;
pub mod cache;
pub mod fetch;
pub mod model;
pub mod realtime;
pub mod scheduler;
pub mod snapshot;
pub mod tables;
pub mod time;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
