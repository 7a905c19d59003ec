//! Property-Based Tests for CCR construction and CCA evaluation

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ogs_diameter::{avp_code, cmd, Avp, AvpValue, DiameterMessage};
    use proptest::prelude::*;

    use crate::ccr_build::{CcRequest, CcrBuilder, CcrSettings};
    use crate::ccr_path::check_answer;
    use crate::context::QosprovConfig;
    use crate::error::ProvisionError;
    use crate::profile::{Imsi, QosProfile};
    use crate::test_util::StepRandom;

    // ========================================================================
    // Strategies for generating test data
    // ========================================================================

    fn arb_imsi() -> impl Strategy<Value = Imsi> {
        "[0-9]{6,15}".prop_map(|s| s.parse::<Imsi>().unwrap())
    }

    fn arb_profile() -> impl Strategy<Value = QosProfile> {
        (".{0,40}", any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(name, max_dl, max_ul, gbr_dl, gbr_ul)| QosProfile {
                name,
                max_bandwidth_dl: max_dl,
                max_bandwidth_ul: max_ul,
                guaranteed_bitrate_dl: gbr_dl,
                guaranteed_bitrate_ul: gbr_ul,
            },
        )
    }

    fn arb_command_code() -> impl Strategy<Value = u32> {
        prop_oneof![
            Just(cmd::CREDIT_CONTROL),
            Just(257u32),
            Just(280u32),
            Just(258u32),
            0u32..0x00FF_FFFF,
        ]
    }

    fn build(seed: u32, imsi: &Imsi, profile: &QosProfile) -> CcRequest {
        let settings = CcrSettings::from(&QosprovConfig::default());
        CcrBuilder::new(settings, StepRandom::new(seed)).build(imsi, profile)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Exactly one Session-Id, shaped `session;<digits>`
        #[test]
        fn prop_session_id_format(seed in any::<u32>(), imsi in arb_imsi(), profile in arb_profile()) {
            let request = build(seed, &imsi, &profile);
            let count = request
                .message()
                .avps
                .iter()
                .filter(|a| a.code() == avp_code::SESSION_ID)
                .count();
            prop_assert_eq!(count, 1);

            let sid = request.session_id().unwrap();
            let suffix = sid.strip_prefix("session;").unwrap();
            prop_assert!(!suffix.is_empty());
            prop_assert!(suffix.bytes().all(|b| b.is_ascii_digit()));
            prop_assert_eq!(suffix.parse::<u32>().unwrap(), seed);
        }

        /// Different random draws give different Session-Ids
        #[test]
        fn prop_session_ids_distinct(a in any::<u32>(), b in any::<u32>(), imsi in arb_imsi()) {
            prop_assume!(a != b);
            let profile = QosProfile::high_priority();
            let first = build(a, &imsi, &profile);
            let second = build(b, &imsi, &profile);
            prop_assert_ne!(first.session_id(), second.session_id());
        }

        /// The profile survives encode and decode, in wire order
        #[test]
        fn prop_qos_payload_round_trip(seed in any::<u32>(), imsi in arb_imsi(), profile in arb_profile()) {
            let config = QosprovConfig::default();
            let request = build(seed, &imsi, &profile);
            prop_assert!(request.validate().is_ok());

            let mut wire: Bytes = request.message().encode().freeze();
            let decoded = DiameterMessage::decode(&mut wire, &config.dictionary()).unwrap();
            let decoded = CcRequest::from_message(decoded, config.qos_avp, config.application.vendor_id);

            let codes: Vec<u32> = decoded.qos_payload().unwrap().children()[1..]
                .iter()
                .map(Avp::code)
                .collect();
            prop_assert_eq!(codes, config.qos_avp.profile_codes().to_vec());
            prop_assert_eq!(decoded.qos_profile(), Some(profile));
            prop_assert_eq!(decoded.subscription_id_data(), Some(imsi.as_str()));
        }

        /// Success iff the answer is a CCA carrying the success Result-Code
        #[test]
        fn prop_answer_classification(
            command_code in arb_command_code(),
            result_code in prop_oneof![Just(2001u32), Just(2002u32), Just(5012u32), any::<u32>()],
            success_code in prop_oneof![Just(2001u32), Just(2002u32)],
        ) {
            let request = build(1, &"460010000000001".parse().unwrap(), &QosProfile::default());
            let mut answer = DiameterMessage::new_answer(request.message());
            answer.header.command_code = command_code;
            answer.add_avp(Avp::mandatory(avp_code::RESULT_CODE, AvpValue::Unsigned32(result_code)));

            let outcome = check_answer(&answer, "session;1", success_code);
            if command_code != cmd::CREDIT_CONTROL {
                prop_assert!(
                    matches!(outcome, Err(ProvisionError::ProtocolMismatch { actual_code }) if actual_code == command_code),
                    "unexpected outcome {:?}",
                    outcome
                );
            } else if result_code == success_code {
                prop_assert!(outcome.is_ok());
            } else {
                prop_assert!(
                    matches!(outcome, Err(ProvisionError::PolicyRejected { result_code: rc }) if rc == result_code),
                    "unexpected outcome {:?}",
                    outcome
                );
            }
        }
    }
}
