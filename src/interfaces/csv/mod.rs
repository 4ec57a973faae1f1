pub mod invoice_reader;
pub mod report_writer;
