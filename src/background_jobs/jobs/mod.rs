mod hourly_pipeline;

pub use hourly_pipeline::WarehousePipelineJob;
