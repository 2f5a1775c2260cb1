// User settings: default paths, file name template, output mode

pub mod settings;

pub use settings::Settings;
