//! Data descriptors: the schema of a signal's samples

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DataRule, Number, Ratio, SampleType};
use crate::{DaqError, Result};

/// Unit of measurement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Unit {
    /// UNECE unit id, -1 when unspecified
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub quantity: String,
}

impl Unit {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { id: -1, symbol: symbol.into(), name: String::new(), quantity: String::new() }
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = quantity.into();
        self
    }
}

/// Expected value range of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub low: Number,
    pub high: Number,
}

impl Range {
    pub fn new(low: impl Into<Number>, high: impl Into<Number>) -> Self {
        Self { low: low.into(), high: high.into() }
    }
}

/// One axis of a multi-dimensional sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
    pub unit: Option<Unit>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self { name: name.into(), size, unit: None }
    }
}

/// Post scaling applied to raw buffer values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Scaling {
    /// `output = raw * scale + offset`
    Linear { scale: f64, offset: f64, input_type: SampleType, output_type: SampleType },
}

impl Scaling {
    pub fn linear(scale: f64, offset: f64, input_type: SampleType, output_type: SampleType) -> Self {
        Scaling::Linear { scale, offset, input_type, output_type }
    }

    pub fn input_type(&self) -> SampleType {
        match self {
            Scaling::Linear { input_type, .. } => *input_type,
        }
    }

    pub fn output_type(&self) -> SampleType {
        match self {
            Scaling::Linear { output_type, .. } => *output_type,
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Scaling::Linear { scale, offset, .. } => raw * scale + offset,
        }
    }
}

/// Immutable description of how raw packet bytes become typed samples.
///
/// Build with [`DataDescriptor::builder`]; `build()` enforces the structural
/// invariants so every descriptor in circulation is consistent. Deserialized
/// descriptors pass the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorFields")]
pub struct DataDescriptor {
    name: String,
    sample_type: SampleType,
    rule: DataRule,
    unit: Option<Unit>,
    value_range: Option<Range>,
    dimensions: Vec<Dimension>,
    struct_fields: Vec<DataDescriptor>,
    post_scaling: Option<Scaling>,
    /// ISO-8601 epoch, domain descriptors only
    origin: Option<String>,
    /// Seconds per tick, domain descriptors only
    tick_resolution: Option<Ratio>,
    metadata: BTreeMap<String, String>,
}

/// Unchecked wire form of [`DataDescriptor`].
#[derive(Deserialize)]
struct DescriptorFields {
    name: String,
    sample_type: SampleType,
    rule: DataRule,
    unit: Option<Unit>,
    value_range: Option<Range>,
    dimensions: Vec<Dimension>,
    struct_fields: Vec<DataDescriptor>,
    post_scaling: Option<Scaling>,
    origin: Option<String>,
    tick_resolution: Option<Ratio>,
    metadata: BTreeMap<String, String>,
}

impl TryFrom<DescriptorFields> for DataDescriptor {
    type Error = DaqError;

    fn try_from(fields: DescriptorFields) -> Result<Self> {
        let descriptor = DataDescriptor {
            name: fields.name,
            sample_type: fields.sample_type,
            rule: fields.rule,
            unit: fields.unit,
            value_range: fields.value_range,
            dimensions: fields.dimensions,
            struct_fields: fields.struct_fields,
            post_scaling: fields.post_scaling,
            origin: fields.origin,
            tick_resolution: fields.tick_resolution,
            metadata: fields.metadata,
        };
        DataDescriptorBuilder { descriptor }.build()
    }
}

impl DataDescriptor {
    pub fn builder() -> DataDescriptorBuilder {
        DataDescriptorBuilder::default()
    }

    /// Start a builder pre-filled with this descriptor's fields.
    pub fn to_builder(&self) -> DataDescriptorBuilder {
        DataDescriptorBuilder { descriptor: self.clone() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn rule(&self) -> &DataRule {
        &self.rule
    }

    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    pub fn value_range(&self) -> Option<Range> {
        self.value_range
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn struct_fields(&self) -> &[DataDescriptor] {
        &self.struct_fields
    }

    pub fn post_scaling(&self) -> Option<&Scaling> {
        self.post_scaling.as_ref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn tick_resolution(&self) -> Option<Ratio> {
        self.tick_resolution
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn is_implicit(&self) -> bool {
        self.rule.is_implicit()
    }

    /// Number of elements per sample (product of dimension sizes).
    pub fn element_count(&self) -> usize {
        self.dimensions.iter().map(|d| d.size).product()
    }

    /// Sample type stored in the buffer: the scaling input type when post
    /// scaling is configured, otherwise the sample type.
    pub fn raw_sample_type(&self) -> SampleType {
        self.post_scaling.map(|s| s.input_type()).unwrap_or(self.sample_type)
    }

    /// Bytes one sample occupies in a packet buffer.
    ///
    /// Zero for implicit rules; `None` for variable-size types.
    pub fn raw_sample_size(&self) -> Option<usize> {
        if self.is_implicit() {
            return Some(0);
        }
        Some(self.element_size(self.raw_sample_type())? * self.element_count())
    }

    /// Bytes one decoded sample occupies; `None` for variable-size types.
    pub fn sample_size(&self) -> Option<usize> {
        Some(self.element_size(self.sample_type)? * self.element_count())
    }

    fn element_size(&self, sample_type: SampleType) -> Option<usize> {
        match sample_type {
            SampleType::Struct => {
                self.struct_fields.iter().map(|f| f.sample_size()).sum::<Option<usize>>()
            }
            other => other.size(),
        }
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.rule.validate()?;

        if self.sample_type == SampleType::Struct {
            if self.struct_fields.is_empty() {
                return Err(DaqError::invalid_descriptor(format!(
                    "struct descriptor '{}' has no fields",
                    self.name
                )));
            }
            for field in &self.struct_fields {
                field.validate()?;
                if field.is_implicit() {
                    return Err(DaqError::invalid_descriptor(format!(
                        "struct field '{}' must use an explicit rule",
                        field.name
                    )));
                }
            }
        } else if !self.struct_fields.is_empty() {
            return Err(DaqError::invalid_descriptor(format!(
                "descriptor '{}' has struct fields but sample type {:?}",
                self.name, self.sample_type
            )));
        }

        if self.is_implicit() {
            if !self.sample_type.is_numeric() {
                return Err(DaqError::invalid_descriptor(format!(
                    "implicit rules require a numeric sample type, got {:?}",
                    self.sample_type
                )));
            }
            if !self.dimensions.is_empty() {
                return Err(DaqError::invalid_descriptor("implicit rules require scalar samples"));
            }
            if self.post_scaling.is_some() {
                return Err(DaqError::invalid_descriptor(
                    "post scaling requires an explicit rule",
                ));
            }
        }

        if let Some(scaling) = &self.post_scaling {
            if scaling.output_type() != self.sample_type {
                return Err(DaqError::invalid_descriptor(format!(
                    "scaling output type {:?} does not match sample type {:?}",
                    scaling.output_type(),
                    self.sample_type
                )));
            }
            if !scaling.input_type().is_numeric() || !scaling.output_type().is_numeric() {
                return Err(DaqError::invalid_descriptor("scaling requires numeric types"));
            }
        }

        if let Some(dim) = self.dimensions.iter().find(|d| d.size == 0) {
            return Err(DaqError::invalid_descriptor(format!(
                "dimension '{}' has size zero",
                dim.name
            )));
        }

        if let Some(resolution) = self.tick_resolution {
            if resolution.denominator == 0 {
                return Err(DaqError::invalid_descriptor("tick resolution denominator is zero"));
            }
        }

        if self.origin.is_some() {
            self.origin_time()?;
        }

        Ok(())
    }
}

/// Builder for [`DataDescriptor`].
#[derive(Debug, Clone)]
pub struct DataDescriptorBuilder {
    descriptor: DataDescriptor,
}

impl Default for DataDescriptorBuilder {
    fn default() -> Self {
        Self {
            descriptor: DataDescriptor {
                name: String::new(),
                sample_type: SampleType::Float64,
                rule: DataRule::explicit(),
                unit: None,
                value_range: None,
                dimensions: Vec::new(),
                struct_fields: Vec::new(),
                post_scaling: None,
                origin: None,
                tick_resolution: None,
                metadata: BTreeMap::new(),
            },
        }
    }
}

impl DataDescriptorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }

    pub fn sample_type(mut self, sample_type: SampleType) -> Self {
        self.descriptor.sample_type = sample_type;
        self
    }

    pub fn rule(mut self, rule: DataRule) -> Self {
        self.descriptor.rule = rule;
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.descriptor.unit = Some(unit);
        self
    }

    pub fn value_range(mut self, range: Range) -> Self {
        self.descriptor.value_range = Some(range);
        self
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.descriptor.dimensions.push(dimension);
        self
    }

    pub fn struct_field(mut self, field: DataDescriptor) -> Self {
        self.descriptor.struct_fields.push(field);
        self
    }

    pub fn post_scaling(mut self, scaling: Scaling) -> Self {
        self.descriptor.post_scaling = Some(scaling);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.descriptor.origin = Some(origin.into());
        self
    }

    pub fn tick_resolution(mut self, resolution: Ratio) -> Self {
        self.descriptor.tick_resolution = Some(resolution);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and produce the descriptor.
    pub fn build(self) -> Result<DataDescriptor> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, sample_type: SampleType) -> DataDescriptor {
        DataDescriptor::builder().name(name).sample_type(sample_type).build().unwrap()
    }

    #[test]
    fn explicit_sample_size_follows_type_and_dimensions() {
        let scalar = field("v", SampleType::Float32);
        assert_eq!(scalar.raw_sample_size(), Some(4));

        let spectrum = DataDescriptor::builder()
            .sample_type(SampleType::Int16)
            .dimension(Dimension::new("bins", 8))
            .dimension(Dimension::new("channels", 2))
            .build()
            .unwrap();
        assert_eq!(spectrum.element_count(), 16);
        assert_eq!(spectrum.raw_sample_size(), Some(32));
    }

    #[test]
    fn implicit_rules_carry_no_payload() {
        let domain = DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::linear(10, 0))
            .build()
            .unwrap();
        assert_eq!(domain.raw_sample_size(), Some(0));
        assert_eq!(domain.sample_size(), Some(8));
        assert!(domain.is_implicit());
    }

    #[test]
    fn struct_size_sums_fields() {
        let desc = DataDescriptor::builder()
            .name("can")
            .sample_type(SampleType::Struct)
            .struct_field(field("id", SampleType::UInt32))
            .struct_field(field("length", SampleType::UInt8))
            .struct_field(field("payload", SampleType::Float64))
            .build()
            .unwrap();
        assert_eq!(desc.raw_sample_size(), Some(13));
    }

    #[test]
    fn struct_without_fields_is_rejected() {
        let result = DataDescriptor::builder().sample_type(SampleType::Struct).build();
        assert!(matches!(result, Err(DaqError::InvalidDescriptor { .. })));

        let result = DataDescriptor::builder()
            .sample_type(SampleType::Int32)
            .struct_field(field("x", SampleType::Int32))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn implicit_rule_requires_numeric_scalar() {
        let result = DataDescriptor::builder()
            .sample_type(SampleType::String)
            .rule(DataRule::constant(1))
            .build();
        assert!(result.is_err());

        let result = DataDescriptor::builder()
            .sample_type(SampleType::Float64)
            .rule(DataRule::constant(1))
            .dimension(Dimension::new("x", 2))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn half_specified_deltas_are_rejected() {
        let result = DataDescriptor::builder()
            .rule(DataRule::Explicit { min_expected_delta: None, max_expected_delta: Some(Number::Int(2)) })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn scaling_sets_raw_type() {
        let desc = DataDescriptor::builder()
            .sample_type(SampleType::Float64)
            .post_scaling(Scaling::linear(0.5, 1.0, SampleType::Int16, SampleType::Float64))
            .build()
            .unwrap();
        assert_eq!(desc.raw_sample_type(), SampleType::Int16);
        assert_eq!(desc.raw_sample_size(), Some(2));
        assert_eq!(desc.sample_size(), Some(8));
    }

    #[test]
    fn scaling_output_must_match_sample_type() {
        let result = DataDescriptor::builder()
            .sample_type(SampleType::Float32)
            .post_scaling(Scaling::linear(0.5, 1.0, SampleType::Int16, SampleType::Float64))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn invalid_origin_is_rejected_at_build() {
        let result = DataDescriptor::builder().origin("yesterday").build();
        assert!(matches!(result, Err(DaqError::OriginParse { .. })));
    }

    #[test]
    fn to_builder_preserves_fields() {
        let desc = DataDescriptor::builder()
            .name("voltage")
            .unit(Unit::new("V").with_quantity("voltage"))
            .value_range(Range::new(-10, 10))
            .metadata("channel", "ai0")
            .build()
            .unwrap();
        let renamed = desc.to_builder().name("voltage2").build().unwrap();
        assert_eq!(renamed.unit(), desc.unit());
        assert_eq!(renamed.metadata().get("channel").map(String::as_str), Some("ai0"));
        assert_ne!(renamed, desc);
    }

    #[test]
    fn descriptor_round_trips_through_yaml() {
        let desc = DataDescriptor::builder()
            .name("time")
            .sample_type(SampleType::Int64)
            .rule(DataRule::linear(1000, 0))
            .origin("1970-01-01T00:00:00Z")
            .tick_resolution(Ratio::new(1, 1_000_000).unwrap())
            .build()
            .unwrap();
        let yaml = serde_yaml_ng::to_string(&desc).unwrap();
        let back: DataDescriptor = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn deserialized_descriptor_is_validated() {
        let desc = DataDescriptor::builder()
            .name("time")
            .sample_type(SampleType::Int64)
            .rule(DataRule::linear(1000, 0))
            .tick_resolution(Ratio::new(1, 1000).unwrap())
            .build()
            .unwrap();
        let yaml = serde_yaml_ng::to_string(&desc).unwrap();
        assert!(yaml.contains("denominator: 1000"));

        let zero = yaml.replace("denominator: 1000", "denominator: 0");
        let err = serde_yaml_ng::from_str::<DataDescriptor>(&zero).unwrap_err();
        assert!(err.to_string().contains("denominator"));

        let binary = yaml.replace("sample_type: Int64", "sample_type: Binary");
        assert!(serde_yaml_ng::from_str::<DataDescriptor>(&binary).is_err());
    }
}
