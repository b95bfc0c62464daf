pub mod meteocat;

pub use meteocat::MeteocatClient;
