//! CSV catalog export → [`CatalogSnapshot`].

use std::{
   fs::File,
   io::{Seek, SeekFrom},
   path::Path,
   sync::Arc,
};

use arrow_array::{
   Array, Float64Array, RecordBatch, StringArray,
   cast::AsArray,
   types::Float64Type,
};
use arrow_csv::{ReaderBuilder, reader::Format};
use arrow_schema::{DataType, Field, Schema};

use crate::{
   catalog::CatalogSnapshot,
   error::{Error, Result},
   types::{PLACEHOLDER_TITLE, ProductRecord},
};

const BATCH_SIZE: usize = 8192;

pub const ID: &str = "content_id_hashed";
pub const TITLE: &str = "content_title";
pub const IMAGE_URL: &str = "image_url";
pub const LEVEL1: &str = "level1_category_name";
pub const LEVEL2: &str = "level2_category_name";
pub const LEAF: &str = "leaf_category_name";
pub const ORIGINAL_PRICE: &str = "original_price";
pub const SELLING_PRICE: &str = "selling_price";
pub const DISCOUNTED_PRICE: &str = "discounted_price";
pub const RATING_AVG: &str = "content_rate_avg";
pub const REVIEW_COUNT: &str = "content_review_count";
pub const RATING_COUNT: &str = "content_rate_count";
pub const MERCHANT_COUNT: &str = "merchant_count";

const NUMERIC: [&str; 7] = [
   ORIGINAL_PRICE,
   SELLING_PRICE,
   DISCOUNTED_PRICE,
   RATING_AVG,
   REVIEW_COUNT,
   RATING_COUNT,
   MERCHANT_COUNT,
];

/// Reads a headed CSV export. Columns are matched by name; unknown columns
/// are ignored and absent optional columns take their defaults.
pub fn load_csv(path: &Path) -> Result<CatalogSnapshot> {
   if !path.exists() {
      return Err(Error::CatalogMissing(path.to_path_buf()));
   }

   let mut file = File::open(path)?;
   let (header, _) = Format::default()
      .with_header(true)
      .infer_schema(&mut file, Some(0))?;
   file.seek(SeekFrom::Start(0))?;

   let fields: Vec<Field> = header
      .fields()
      .iter()
      .map(|f| {
         let data_type =
            if NUMERIC.contains(&f.name().as_str()) { DataType::Float64 } else { DataType::Utf8 };
         Field::new(f.name(), data_type, true)
      })
      .collect();
   let schema = Arc::new(Schema::new(fields));
   if schema.index_of(ID).is_err() {
      return Err(Error::InvalidCatalog(format!("{} has no '{ID}' column", path.display())));
   }

   let reader = ReaderBuilder::new(schema)
      .with_header(true)
      .with_batch_size(BATCH_SIZE)
      .build(file)?;

   let mut records = Vec::new();
   let mut skipped = 0usize;
   for batch in reader {
      skipped += append_records(&batch?, &mut records);
   }
   if skipped > 0 {
      tracing::warn!("skipped {} catalog rows without a product id", skipped);
   }

   tracing::info!("loaded {} products from {}", records.len(), path.display());
   Ok(CatalogSnapshot::new(records))
}

fn text<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
   batch.column_by_name(name).and_then(|c| c.as_string_opt::<i32>())
}

fn number<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float64Array> {
   batch
      .column_by_name(name)
      .and_then(|c| c.as_primitive_opt::<Float64Type>())
}

fn text_at(column: Option<&StringArray>, row: usize) -> Option<&str> {
   column.filter(|c| c.is_valid(row)).map(|c| c.value(row).trim())
}

fn number_at(column: Option<&Float64Array>, row: usize) -> Option<f64> {
   column
      .filter(|c| c.is_valid(row))
      .map(|c| c.value(row))
      .filter(|v| v.is_finite())
}

fn count(value: Option<f64>) -> u32 {
   value.map_or(0, |v| v.max(0.0).round() as u32)
}

/// Appends one record per row with an id; returns how many rows were skipped.
fn append_records(batch: &RecordBatch, out: &mut Vec<ProductRecord>) -> usize {
   let ids = text(batch, ID);
   let titles = text(batch, TITLE);
   let images = text(batch, IMAGE_URL);
   let level1 = text(batch, LEVEL1);
   let level2 = text(batch, LEVEL2);
   let leaf = text(batch, LEAF);
   let original = number(batch, ORIGINAL_PRICE);
   let selling = number(batch, SELLING_PRICE);
   let discounted = number(batch, DISCOUNTED_PRICE);
   let rating = number(batch, RATING_AVG);
   let reviews = number(batch, REVIEW_COUNT);
   let ratings = number(batch, RATING_COUNT);
   let merchants = number(batch, MERCHANT_COUNT);

   let mut skipped = 0;
   out.reserve(batch.num_rows());
   for row in 0..batch.num_rows() {
      let Some(id) = text_at(ids, row).filter(|id| !id.is_empty()) else {
         skipped += 1;
         continue;
      };
      let title = text_at(titles, row).filter(|t| !t.is_empty()).unwrap_or(PLACEHOLDER_TITLE);

      out.push(ProductRecord {
         id:               id.to_string(),
         title:            title.to_string(),
         image_url:        text_at(images, row).unwrap_or_default().to_string(),
         level1_category:  text_at(level1, row).unwrap_or_default().to_string(),
         level2_category:  text_at(level2, row).unwrap_or_default().to_string(),
         leaf_category:    text_at(leaf, row).unwrap_or_default().to_string(),
         original_price:   number_at(original, row).unwrap_or(0.0),
         selling_price:    number_at(selling, row).unwrap_or(0.0),
         discounted_price: number_at(discounted, row).unwrap_or(0.0),
         rating_avg:       number_at(rating, row).map(|r| r as f32),
         review_count:     count(number_at(reviews, row)),
         rating_count:     count(number_at(ratings, row)),
         merchant_count:   number_at(merchants, row).unwrap_or(0.0) as f32,
      });
   }
   skipped
}
