pub mod test_rows;
