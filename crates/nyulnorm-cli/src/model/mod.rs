pub mod standardization_model;
