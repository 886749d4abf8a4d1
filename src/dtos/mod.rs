pub mod gigdtos;
