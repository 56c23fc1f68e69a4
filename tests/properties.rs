//! Property tests for the escape and round-trip laws.

use std::collections::HashMap;

use proptest::prelude::*;

use ngxfmt::{ngx_record, Escape, Template};

ngx_record! {
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sampled {
        text: String => "text",
        signed: i64 => "signed",
        unsigned: u64 => "unsigned",
        flag: bool => "flag",
    }
}

proptest! {
    #[test]
    fn default_escape_unescape_is_identity(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
        let escaped = Escape::Default.escape(&raw);
        let back = Escape::Default.unescape(&escaped).unwrap();
        prop_assert_eq!(back.as_ref(), raw.as_slice());
    }

    #[test]
    fn json_escape_unescape_is_identity(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
        let escaped = Escape::Json.escape(&raw);
        let back = Escape::Json.unescape(&escaped).unwrap();
        prop_assert_eq!(back.as_ref(), raw.as_slice());
    }

    #[test]
    fn record_round_trip(
        text in "[a-zA-Z0-9 ._-]{0,40}",
        signed in any::<i64>(),
        unsigned in any::<u64>(),
        flag in any::<bool>(),
    ) {
        let template =
            Template::new(r#"t="$text" s=$signed u=$unsigned f=$flag"#).unwrap();
        let sample = Sampled { text, signed, unsigned, flag };

        let line = template.marshal(&sample).unwrap();
        let mut back = Sampled::default();
        template.unmarshal(&line, &mut back).unwrap();
        prop_assert_eq!(back, sample);
    }

    #[test]
    fn mapping_round_trip(
        first in "[a-z0-9]{0,24}",
        second in "[a-z0-9]{0,24}",
    ) {
        let template = Template::new("$first | $second").unwrap();
        let mut fields: HashMap<String, String> = HashMap::new();
        fields.insert("first".into(), first);
        fields.insert("second".into(), second);

        let line = template.marshal(&fields).unwrap();
        let mut back: HashMap<String, String> = HashMap::new();
        template.unmarshal(&line, &mut back).unwrap();
        prop_assert_eq!(back, fields);
    }

    #[test]
    fn quoted_string_fields_survive_escaping(text in "[a-zA-Z0-9 \"]{0,40}") {
        // embedded quotes render as `\"`, so the quoted delimiter
        // exercises the escaped-delimiter scan
        let template = Template::new(r#"v="$text" end"#).unwrap();
        let sample = Sampled { text, ..Sampled::default() };

        let line = template.marshal(&sample).unwrap();
        let mut back = Sampled::default();
        template.unmarshal(&line, &mut back).unwrap();
        prop_assert_eq!(&back.text, &sample.text);
    }
}
