//! 缓存模块 - 水位线等热数据的快速读写层

pub mod update_time;

pub use update_time::UpdateTimeCache;
