use std::fmt;

use crate::error::AcquireError;

/// Text with a fixed byte capacity. Longer input is cut at the last char
/// boundary that still fits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedString<const CAP: usize> {
    inner: String,
}

impl<const CAP: usize> BoundedString<CAP> {
    pub fn new() -> Self {
        Self {
            inner: String::with_capacity(CAP),
        }
    }

    /// Replaces the content. Returns `true` when `value` had to be truncated.
    pub fn set(&mut self, value: &str) -> bool {
        let mut end = value.len().min(CAP);
        while !value.is_char_boundary(end) {
            end -= 1;
        }

        self.inner.clear();
        self.inner.push_str(&value[..end]);

        end < value.len()
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<const CAP: usize> From<&str> for BoundedString<CAP> {
    fn from(value: &str) -> Self {
        let mut s = Self::new();
        s.set(value);
        s
    }
}

impl<const CAP: usize> fmt::Display for BoundedString<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

pub type ShortText = BoundedString<15>;
pub type LongText = BoundedString<31>;

/// Destination of an extracted JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// `"<lat>,<lon>"`, split into latitude and longitude on assignment.
    Loc,
    Timezone,
    City,
    Time,
    Temperature,
    Humidity,
    WindSpeed,
    WeatherCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFields {
    pub latitude: ShortText,
    pub longitude: ShortText,
    pub timezone: LongText,
    pub city: ShortText,
}

impl LocationFields {
    pub fn has_coordinates(&self) -> bool {
        !self.latitude.is_empty() && !self.longitude.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherFields {
    /// Observation time as reported by the weather service (GMT).
    pub time: LongText,
    pub temperature: ShortText,
    pub humidity: ShortText,
    pub wind_speed: ShortText,
    pub weather_code: ShortText,
}

/// Values pulled out of the geolocation and weather documents.
///
/// Matched fields are overwritten in place on every cycle; nothing older is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub location: LocationFields,
    pub weather: WeatherFields,
}

impl ExtractedFields {
    /// Stores `value` in the field named by `id`.
    ///
    /// A `Loc` value without a comma leaves latitude and longitude untouched.
    pub fn assign(&mut self, id: FieldId, value: &str) -> Result<(), AcquireError> {
        match id {
            FieldId::Loc => {
                let (lat, lon) =
                    value
                        .split_once(',')
                        .ok_or_else(|| AcquireError::FieldMismatch {
                            key: "loc",
                            value: value.to_string(),
                        })?;
                self.location.latitude.set(lat);
                self.location.longitude.set(lon);
            }
            FieldId::Timezone => {
                self.location.timezone.set(value);
            }
            FieldId::City => {
                self.location.city.set(value);
            }
            FieldId::Time => {
                self.weather.time.set(value);
            }
            FieldId::Temperature => {
                self.weather.temperature.set(value);
            }
            FieldId::Humidity => {
                self.weather.humidity.set(value);
            }
            FieldId::WindSpeed => {
                self.weather.wind_speed.set(value);
            }
            FieldId::WeatherCode => {
                self.weather.weather_code.set(value);
            }
        }

        Ok(())
    }
}

impl fmt::Display for ExtractedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = &self.location;
        let wx = &self.weather;
        writeln!(f, "City:         {}", loc.city)?;
        writeln!(f, "Timezone:     {}", loc.timezone)?;
        writeln!(f, "Latitude:     {}", loc.latitude)?;
        writeln!(f, "Longitude:    {}", loc.longitude)?;
        writeln!(f, "Time (GMT):   {}", wx.time)?;
        writeln!(f, "Temperature:  {} °C", wx.temperature)?;
        writeln!(f, "Humidity:     {} %", wx.humidity)?;
        writeln!(f, "Wind speed:   {} km/h", wx.wind_speed)?;
        write!(f, "Weather code: {}", wx.weather_code)
    }
}
